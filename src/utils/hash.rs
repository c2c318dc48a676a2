use serde::Serialize;

use crate::auth::PasswordHasher;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HashResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Hash one named value, e.g. `gen_hash(hasher, "password", "hunter2")`
pub fn gen_hash(hasher: &dyn PasswordHasher, field: &str, value: &str) -> HashResult {
    if field.trim().is_empty() {
        log::error!("Hash requested without a field name");
        return HashResult {
            success: false,
            message: "Internal Server Error!".to_string(),
            hash: None,
        };
    }

    match hasher.hash(value) {
        Ok(hash) => HashResult {
            success: true,
            message: format!("Successfully hashed {}!", field),
            hash: Some(hash),
        },
        Err(err) => {
            log::error!("Unable to hash {}: {}", field, err);
            HashResult {
                success: false,
                message: format!("Unable to hash {}!", field),
                hash: None,
            }
        }
    }
}
