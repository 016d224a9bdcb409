use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config;
use crate::error;
use crate::sec;
use crate::sec::authn::flow::AuthFlow;
use crate::sec::authn::session::SessionManager;
use crate::store::{self, ArcStore};
use crate::template;

pub struct Shared {
    assets: PathBuf,
    templates: template::Templates,
    store: ArcStore,
    sessions: SessionManager,
    sec: sec::state::Sec,
}

pub type ArcShared = Arc<Shared>;

impl Shared {
    pub async fn from_config(config: &config::Config) -> error::Result<Shared> {
        tracing::debug!("creating Shared state");

        Ok(Shared {
            assets: config.settings.assets.clone(),
            templates: template::Templates::from_config(config)?,
            store: store::from_config(config).await?,
            sessions: SessionManager::new(),
            sec: sec::state::Sec::from_config(config)?,
        })
    }

    pub fn assets(&self) -> &Path {
        &self.assets
    }

    pub fn templates(&self) -> &template::Templates {
        &self.templates
    }

    pub fn store(&self) -> &ArcStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sec(&self) -> &sec::state::Sec {
        &self.sec
    }

    #[inline]
    pub fn auth(&self) -> &sec::state::Sec {
        self.sec()
    }

    /// the auth operations wired up against this state
    pub fn auth_flow(&self) -> AuthFlow<'_> {
        AuthFlow::new(self.store.as_ref(), &self.sessions, &self.sec)
    }
}

impl AsRef<sec::state::Sec> for Shared {
    fn as_ref(&self) -> &sec::state::Sec {
        &self.sec
    }
}

impl AsRef<SessionManager> for Shared {
    fn as_ref(&self) -> &SessionManager {
        &self.sessions
    }
}

impl AsRef<ArcStore> for Shared {
    fn as_ref(&self) -> &ArcStore {
        &self.store
    }
}

impl AsRef<template::Templates> for Shared {
    fn as_ref(&self) -> &template::Templates {
        &self.templates
    }
}
