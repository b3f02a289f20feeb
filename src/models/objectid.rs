use uuid::Uuid;

/// Build an identifier of the form `<prefix>_<32 hex chars>`.
pub fn create_object_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
