pub mod callbacks;
pub mod common;
pub mod discovery;
pub mod stream;
pub mod v2;
pub mod watches;
