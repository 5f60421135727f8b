/// Persistence entities.
pub mod models;
/// Show persistence behind the data-access trait.
pub mod show_store;
/// Backend-neutral storage errors.
pub mod storage;
