//! Management policy gate.

use crate::crd::ManagementPolicy;

/// A lifecycle phase the reconciler may perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementAction {
    Observe,
    Create,
    Update,
    LateInitialize,
    Delete,
}

impl ManagementPolicy {
    #[must_use]
    pub fn allows(self, action: ManagementAction) -> bool {
        use ManagementAction::{Create, Delete, LateInitialize, Observe, Update};
        use ManagementPolicy::{
            FullControl, ObserveCreate, ObserveCreateUpdate, ObserveDelete, ObserveOnly,
            ObserveUpdate,
        };
        match (self, action) {
            (_, Observe) | (FullControl, _) => true,
            (ObserveOnly, _) => false,
            (ObserveCreate, Create | LateInitialize)
            | (ObserveCreateUpdate, Create | Update | LateInitialize)
            | (ObserveUpdate, Update | LateInitialize)
            | (ObserveDelete, Delete) => true,
            _ => false,
        }
    }
}
