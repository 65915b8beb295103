//! Component-level error types.

/// Errors raised by the component registry.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// A component with this name is already registered.
    #[error("component '{0}' is already registered")]
    Duplicate(String),

    /// No component with this name has been registered.
    #[error("unknown component '{0}'")]
    Unknown(String),

    /// The user-supplied constructor rejected its arguments.
    #[error("constructor for component '{component}' failed")]
    Construct {
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Reasons a `has`/`not` declaration can never be satisfied or is malformed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    /// A component name is both required and forbidden.
    #[error("component '{0}' is listed in both `has` and `not`")]
    Overlap(String),

    /// A component name appears twice in the same list.
    #[error("component '{0}' is listed more than once")]
    Repeated(String),

    /// An empty string was given as a component name.
    #[error("empty component name")]
    EmptyName,
}
