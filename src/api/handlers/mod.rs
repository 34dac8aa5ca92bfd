pub mod executor;
pub use self::executor::{cancel, executor_get, executor_post};

pub mod health;
pub use self::health::health;

pub mod session;
