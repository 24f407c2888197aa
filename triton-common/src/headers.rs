//! Header names understood by the Triton blob service.

pub const OBJECT_ID: &str = "X-Objectid";
pub const HASH_TYPE: &str = "X-Hash-Type";
pub const SERVER_TOKEN: &str = "X-Mozy-Server-Token";
