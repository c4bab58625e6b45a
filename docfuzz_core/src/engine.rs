use crate::value::Opts;
use thiserror::Error;

/// Errors an engine may report for a single parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The invocation does not satisfy the usage doc.
    #[error("user error: {0}")]
    User(String),
    /// Anything else: a malformed usage doc, a crashed testee, an unreadable result.
    #[error("engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn is_user_error(&self) -> bool {
        matches!(self, EngineError::User(_))
    }
}

/// Completion hook an engine calls where it would otherwise print usage or help text
/// and terminate the process.
///
/// `error` is `None` for an explicit help or version request.
pub trait HelpHandler {
    fn handle(&self, error: Option<&EngineError>, usage: &str);
}

impl<F> HelpHandler for F
where
    F: Fn(Option<&EngineError>, &str),
{
    fn handle(&self, error: Option<&EngineError>, usage: &str) {
        self(error, usage)
    }
}

/// A `HelpHandler` that prints nothing and never exits, so the engine's
/// help and abort paths come back to the caller as ordinary return values.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHelpHandler;

impl HelpHandler for NoHelpHandler {
    fn handle(&self, _error: Option<&EngineError>, _usage: &str) {}
}

/// The usage-pattern engine under test.
///
/// Implementations must route every help, usage or abort path through `help`
/// instead of writing to the console or exiting.
pub trait Engine {
    fn parse(
        &self,
        doc: &str,
        argv: &[String],
        version: &str,
        help: &dyn HelpHandler,
    ) -> Result<Opts, EngineError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn parse(
        &self,
        doc: &str,
        argv: &[String],
        version: &str,
        help: &dyn HelpHandler,
    ) -> Result<Opts, EngineError> {
        (**self).parse(doc, argv, version, help)
    }
}
