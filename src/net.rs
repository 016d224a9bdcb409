pub mod error;
pub mod mime;
pub mod cookie;
pub mod html;
pub mod fs;
