use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPolicy {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: Uuid,
    pub policy_id: Uuid,
    pub enabled: bool,
}
