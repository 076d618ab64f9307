use crate::states::LifecycleState;
use crate::view::ViewId;
use thiserror::Error;

/// Errors from view lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    /// A lifecycle operation was requested from a state that does not allow it.
    #[error("view {view}: cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        view: ViewId,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("view {0}: rerender requested while its output is being rendered")]
    RerenderWhileRendering(ViewId),

    #[error("view {0}: cannot rerender a view that is being destroyed")]
    Destroyed(ViewId),

    /// The target of a scheduled task no longer exists.
    #[error("view {0} no longer exists")]
    ViewGone(ViewId),
}
