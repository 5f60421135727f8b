pub mod aggregate;
pub mod health;
pub mod show;
pub mod sse;
