pub mod config;
pub mod engine;
pub mod executor;
pub mod feedback;
pub mod input;
pub mod oracle;
pub mod testcase;
pub mod value;

pub use config::{ConfigError, DocfuzzConfig};
pub use engine::{Engine, EngineError, HelpHandler, NoHelpHandler};
pub use executor::{CommandEngine, CommandEngineConfig, InputDelivery};
pub use feedback::{Feedback, OracleFeedback};
pub use input::Input;
pub use oracle::{
    Assessment, Divergence, DivergenceOracle, DivergenceReport, Oracle, Verdict, assess,
    assess_bytes, evaluate, evaluate_bytes,
};
pub use testcase::{CorpusRecord, DecodeError, Expectation, decode};
pub use value::{Opts, Value, opts_agree};
