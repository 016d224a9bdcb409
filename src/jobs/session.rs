use crate::error;
use crate::state;

pub async fn cleanup(state: state::ArcShared) -> error::Result<()> {
    let now = state.auth().clock().now();

    let dropped = state.sessions().prune(&now);

    if dropped > 0 {
        tracing::info!("dropped {dropped} expired sessions");
    }

    Ok(())
}
