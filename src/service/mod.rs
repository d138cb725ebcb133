//! Request-level services: upload ingestion, download, deletion and the
//! background expiration worker.

pub mod id;
pub mod extension;
pub mod upload;
pub mod download;
pub mod deletion;
pub mod expiration_worker;
