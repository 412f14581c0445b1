use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

/// Capabilities checked before each coordinator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateOrder,
    UpdateOrder,
    ReceiveItems,
    SubmitBudget,
    RecordCustomerApproval,
    CompleteWork,
    MarkReadyForDelivery,
    Deliver,
    AttachEvidence,
    ViewHistory,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateOrder => "create_order",
            Action::UpdateOrder => "update_order",
            Action::ReceiveItems => "receive_items",
            Action::SubmitBudget => "submit_budget",
            Action::RecordCustomerApproval => "record_customer_approval",
            Action::CompleteWork => "complete_work",
            Action::MarkReadyForDelivery => "mark_ready_for_delivery",
            Action::Deliver => "deliver",
            Action::AttachEvidence => "attach_evidence",
            Action::ViewHistory => "view_history",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().replace('_', " "))
    }
}

/// What an action is performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    NewOrder { customer_id: Uuid },
    Order(Uuid),
}

#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn can(&self, user: Uuid, action: Action, resource: &Resource) -> bool;
}

/// Permits everything. For tests and single-user setups.
pub struct AllowAll;

#[async_trait]
impl AuthorizationGate for AllowAll {
    async fn can(&self, _user: Uuid, _action: Action, _resource: &Resource) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Reception,
    Technician,
    Auditor,
}

impl Role {
    pub fn permits(&self, action: Action) -> bool {
        use Action::*;
        match self {
            Role::Admin => true,
            Role::Reception => matches!(
                action,
                CreateOrder | UpdateOrder | ReceiveItems | RecordCustomerApproval | Deliver | AttachEvidence | ViewHistory
            ),
            Role::Technician => matches!(
                action,
                SubmitBudget | CompleteWork | MarkReadyForDelivery | AttachEvidence | ViewHistory
            ),
            Role::Auditor => action == ViewHistory,
        }
    }
}

/// Static user-to-role table. Unknown users are denied.
#[derive(Debug, Clone, Default)]
pub struct RoleGate {
    roles: HashMap<Uuid, Role>,
}

impl RoleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, user: Uuid, role: Role) -> Self {
        self.roles.insert(user, role);
        self
    }
}

#[async_trait]
impl AuthorizationGate for RoleGate {
    async fn can(&self, user: Uuid, action: Action, _resource: &Resource) -> bool {
        self.roles.get(&user).is_some_and(|role| role.permits(action))
    }
}
