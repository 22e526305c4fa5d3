use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 客户分区键 (租户 + 客户名)
///
/// 所有读取、加锁与提交都以该键为范围；不同租户之间不共享任何记录。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerKey {
    pub tenant_id: Uuid,
    pub customer_name: String,
}

impl CustomerKey {
    pub fn new(tenant_id: Uuid, customer_name: impl Into<String>) -> Self {
        Self {
            tenant_id,
            customer_name: customer_name.into(),
        }
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.customer_name)
    }
}
