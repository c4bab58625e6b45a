use crate::engine::{Engine, EngineError, NoHelpHandler};
use crate::input::Input;
use crate::testcase::{self, CorpusRecord, DecodeError, Expectation};
use crate::value::opts_agree;
use tracing::{debug, info};

/// Version string handed to the engine for every evaluation.
const ORACLE_VERSION: &str = "";

/// Outcome of judging one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The recorded expectation was confirmed by the engine.
    Interesting,
    /// The sample was rejected, or the engine disagreed with it.
    NotInteresting,
}

impl Verdict {
    pub fn is_interesting(self) -> bool {
        self == Verdict::Interesting
    }

    /// go-fuzz style retention score: 1 keeps the sample, 0 does not.
    pub fn score(self) -> i32 {
        match self {
            Verdict::Interesting => 1,
            Verdict::NotInteresting => 0,
        }
    }
}

/// How the engine's behavior departed from a record's expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// A user error was expected but the engine produced a result.
    UnexpectedSuccess,
    /// A result was expected but the engine reported a user error.
    UnexpectedUserError(String),
    /// Both sides succeeded with different mappings.
    ResultMismatch,
    /// The engine failed with something other than a user error.
    EngineFailure(String),
}

impl Divergence {
    pub fn describe(&self) -> String {
        match self {
            Divergence::UnexpectedSuccess => {
                "engine accepted an invocation recorded as user-error".to_string()
            }
            Divergence::UnexpectedUserError(msg) => {
                format!("engine rejected an invocation recorded as valid: {msg}")
            }
            Divergence::ResultMismatch => {
                "engine result differs from the recorded mapping".to_string()
            }
            Divergence::EngineFailure(msg) => format!("engine failed: {msg}"),
        }
    }
}

/// Detailed classification behind a [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    Confirmed,
    Rejected(DecodeError),
    Divergence(Divergence),
}

impl Assessment {
    pub fn verdict(&self) -> Verdict {
        match self {
            Assessment::Confirmed => Verdict::Interesting,
            Assessment::Rejected(_) | Assessment::Divergence(_) => Verdict::NotInteresting,
        }
    }
}

/// Runs the engine on a decoded record and classifies the result against its expectation.
///
/// The engine is given a no-op help handler, so help requests and aborts come back as
/// ordinary results rather than ending the process.
pub fn assess<E: Engine + ?Sized>(record: &CorpusRecord, engine: &E) -> Assessment {
    let outcome = engine.parse(record.doc(), record.argv(), ORACLE_VERSION, &NoHelpHandler);

    match (record.expectation(), outcome) {
        (Expectation::UserError, Err(EngineError::User(_))) => Assessment::Confirmed,
        (Expectation::UserError, Ok(_)) => Assessment::Divergence(Divergence::UnexpectedSuccess),
        (Expectation::Result(expected), Ok(actual)) => {
            if opts_agree(expected, &actual) {
                Assessment::Confirmed
            } else {
                Assessment::Divergence(Divergence::ResultMismatch)
            }
        }
        (Expectation::Result(_), Err(EngineError::User(msg))) => {
            Assessment::Divergence(Divergence::UnexpectedUserError(msg))
        }
        (_, Err(EngineError::Internal(msg))) => {
            Assessment::Divergence(Divergence::EngineFailure(msg))
        }
    }
}

/// Decodes a raw sample and assesses it. Rejected samples never reach the engine.
pub fn assess_bytes<E: Engine + ?Sized>(raw: &[u8], engine: &E) -> Assessment {
    let assessment = match testcase::decode(raw) {
        Ok(record) => assess(&record, engine),
        Err(e) => Assessment::Rejected(e),
    };
    match &assessment {
        Assessment::Confirmed => debug!(len = raw.len(), "expectation confirmed"),
        Assessment::Rejected(e) => debug!(kind = e.kind(), error = %e, "sample rejected"),
        Assessment::Divergence(divergence) => info!(
            input_hash = %input_hash(raw),
            divergence = %divergence.describe(),
            "engine diverged"
        ),
    }
    assessment
}

/// Lowercase hex MD5 of a sample.
pub fn input_hash(raw: &[u8]) -> String {
    format!("{:x}", md5::compute(raw))
}

pub fn evaluate<E: Engine + ?Sized>(record: &CorpusRecord, engine: &E) -> Verdict {
    assess(record, engine).verdict()
}

pub fn evaluate_bytes<E: Engine + ?Sized>(raw: &[u8], engine: &E) -> Verdict {
    assess_bytes(raw, engine).verdict()
}

/// A sample on which the engine disagreed with its recorded expectation.
#[derive(Debug)]
pub struct DivergenceReport<I: Input> {
    /// The raw sample.
    pub input: I,
    /// What went differently.
    pub divergence: Divergence,
    /// Lowercase hex MD5 of the sample, for deduplication.
    pub input_hash: String,
}

impl<I: Input> DivergenceReport<I> {
    pub fn new(input: I, divergence: Divergence) -> Self {
        let input_hash = input_hash(input.as_bytes());
        Self {
            input,
            divergence,
            input_hash,
        }
    }

    pub fn description(&self) -> String {
        self.divergence.describe()
    }
}

/// An `Oracle` examines a sample and reports it when it exposes a divergence.
pub trait Oracle<I: Input>: Send + Sync {
    fn examine(&self, input: &I) -> Option<DivergenceReport<I>>;
}

/// Reports every decodable sample whose expectation the engine does not confirm.
///
/// Rejected samples are not reported: they say nothing about the engine.
#[derive(Debug)]
pub struct DivergenceOracle<E> {
    engine: E,
}

impl<E: Engine> DivergenceOracle<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<I, E> Oracle<I> for DivergenceOracle<E>
where
    I: Input,
    E: Engine + Send + Sync,
{
    fn examine(&self, input: &I) -> Option<DivergenceReport<I>> {
        match assess_bytes(input.as_bytes(), &self.engine) {
            Assessment::Divergence(divergence) => {
                Some(DivergenceReport::new(input.clone(), divergence))
            }
            Assessment::Confirmed | Assessment::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::HelpHandler;
    use crate::value::{Opts, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Engine stub that returns a fixed outcome and counts its calls.
    pub(crate) struct FixedEngine {
        pub outcome: Result<Opts, EngineError>,
        pub calls: AtomicUsize,
    }

    impl FixedEngine {
        pub fn new(outcome: Result<Opts, EngineError>) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Engine for FixedEngine {
        fn parse(
            &self,
            _doc: &str,
            _argv: &[String],
            version: &str,
            help: &dyn HelpHandler,
        ) -> Result<Opts, EngineError> {
            assert_eq!(version, "", "oracle must pass an empty version");
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = &self.outcome {
                help.handle(Some(e), "Usage: prog");
            }
            self.outcome.clone()
        }
    }

    fn sample(doc: &str, invocation: &str, expectation: &str) -> Vec<u8> {
        format!("{doc}\n~~~\n{invocation}\n~~~\n{expectation}").into_bytes()
    }

    fn opts(entries: &[(&str, Value)]) -> Opts {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn boolean_expectation_is_rejected_without_calling_engine() {
        let engine = FixedEngine::new(Ok(opts(&[])));
        let raw = sample("Usage: prog [-v]", "prog -v", r#"{"-v": true}"#);
        let assessment = assess_bytes(&raw, &engine);
        assert!(matches!(assessment, Assessment::Rejected(DecodeError::UnsupportedShape(_))));
        assert_eq!(assessment.verdict(), Verdict::NotInteresting);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0, "engine must not run on rejected samples");
    }

    #[test]
    fn whole_number_expectation_matches_integer_result() {
        let engine = FixedEngine::new(Ok(opts(&[("--count", Value::Int(3))])));
        let raw = sample("Usage: prog --count=<n>", "prog --count=3", r#"{"--count": 3.0}"#);
        assert_eq!(evaluate_bytes(&raw, &engine), Verdict::Interesting);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn list_expectation_requires_same_order() {
        let raw = sample(
            "Usage: prog FILE...",
            "prog a.txt b.txt",
            r#"{"FILE": ["a.txt", "b.txt"]}"#,
        );
        let same = FixedEngine::new(Ok(opts(&[(
            "FILE",
            Value::List(vec!["a.txt".into(), "b.txt".into()]),
        )])));
        assert_eq!(evaluate_bytes(&raw, &same), Verdict::Interesting);

        let reordered = FixedEngine::new(Ok(opts(&[(
            "FILE",
            Value::List(vec!["b.txt".into(), "a.txt".into()]),
        )])));
        assert_eq!(
            assess_bytes(&raw, &reordered),
            Assessment::Divergence(Divergence::ResultMismatch)
        );
    }

    #[test]
    fn user_error_expectation_with_engine_success_diverges() {
        let engine = FixedEngine::new(Ok(opts(&[])));
        let raw = sample("Usage: prog", "prog extra", "\"user-error\"");
        assert_eq!(
            assess_bytes(&raw, &engine),
            Assessment::Divergence(Divergence::UnexpectedSuccess)
        );
        assert_eq!(evaluate_bytes(&raw, &engine), Verdict::NotInteresting);
    }

    #[test]
    fn user_error_expectation_with_engine_user_error_is_interesting() {
        let engine = FixedEngine::new(Err(EngineError::User("unexpected argument".into())));
        let raw = sample("Usage: prog", "prog extra", "\"user-error\"");
        let verdict = evaluate_bytes(&raw, &engine);
        assert_eq!(verdict, Verdict::Interesting);
        assert_eq!(verdict.score(), 1);
    }

    #[test]
    fn internal_engine_error_is_never_interesting() {
        let engine = FixedEngine::new(Err(EngineError::Internal("bad usage doc".into())));
        for expectation in ["\"user-error\"", "{}"] {
            let raw = sample("Usage: prog", "prog", expectation);
            assert_eq!(
                assess_bytes(&raw, &engine),
                Assessment::Divergence(Divergence::EngineFailure("bad usage doc".into())),
                "for {expectation}"
            );
        }
    }

    #[test]
    fn user_error_when_result_expected_diverges() {
        let engine = FixedEngine::new(Err(EngineError::User("missing FILE".into())));
        let raw = sample("Usage: prog FILE", "prog", r#"{"FILE": "x"}"#);
        assert_eq!(
            assess_bytes(&raw, &engine),
            Assessment::Divergence(Divergence::UnexpectedUserError("missing FILE".into()))
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = FixedEngine::new(Ok(opts(&[("<x>", Value::Str("y".into()))])));
        let raw = sample("Usage: prog <x>", "prog y", r#"{"<x>": "y"}"#);
        let record = testcase::decode(&raw).unwrap();
        let first = evaluate(&record, &engine);
        for _ in 0..5 {
            assert_eq!(evaluate(&record, &engine), first);
        }
        assert_eq!(first, Verdict::Interesting);
    }

    #[test]
    fn malformed_sample_scores_zero() {
        let engine = FixedEngine::new(Ok(opts(&[])));
        let verdict = evaluate_bytes(b"\xff\x00 not a testcase", &engine);
        assert_eq!(verdict.score(), 0);
        assert!(!verdict.is_interesting());
    }

    #[test]
    fn divergence_oracle_reports_with_md5_hash() {
        let oracle = DivergenceOracle::new(FixedEngine::new(Ok(opts(&[]))));
        let raw = sample("Usage: prog", "prog extra", "\"user-error\"");
        let report = <DivergenceOracle<FixedEngine> as Oracle<Vec<u8>>>::examine(&oracle, &raw);
        let Some(report) = report else {
            panic!("Oracle should report an unexpected success");
        };
        assert_eq!(report.input, raw, "Report input should be the raw sample");
        assert_eq!(report.divergence, Divergence::UnexpectedSuccess);
        assert_eq!(report.input_hash, format!("{:x}", md5::compute(&raw)));
        assert!(report.description().contains("user-error"));
    }

    #[test]
    fn divergence_oracle_ignores_confirmed_and_rejected_samples() {
        let oracle = DivergenceOracle::new(FixedEngine::new(Err(EngineError::User("no".into()))));
        let confirmed = sample("Usage: prog", "prog extra", "\"user-error\"");
        let rejected = b"no separators at all".to_vec();
        assert!(Oracle::<Vec<u8>>::examine(&oracle, &confirmed).is_none());
        assert!(Oracle::<Vec<u8>>::examine(&oracle, &rejected).is_none());
        assert_eq!(oracle.engine().calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_by(f: impl FnOnce()) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn assess_bytes_logs_each_outcome_once() {
        let engine = FixedEngine::new(Ok(opts(&[])));
        let diverging = sample("Usage: prog", "prog extra", "\"user-error\"");
        let confirmed = sample("Usage: prog", "prog", "{}");

        let log = logged_by(|| {
            assert!(matches!(assess_bytes(&diverging, &engine), Assessment::Divergence(_)));
            assert!(matches!(assess_bytes(&confirmed, &engine), Assessment::Confirmed));
            assert!(matches!(assess_bytes(b"garbage", &engine), Assessment::Rejected(_)));
        });

        assert_eq!(log.matches("engine diverged").count(), 1, "log was:\n{log}");
        assert_eq!(log.matches("expectation confirmed").count(), 1, "log was:\n{log}");
        assert_eq!(log.matches("sample rejected").count(), 1, "log was:\n{log}");
        assert!(
            log.contains(&format!("input_hash={}", input_hash(&diverging))),
            "divergence should carry the sample hash, log was:\n{log}"
        );
        assert!(log.contains("kind=\"malformed-segments\""), "log was:\n{log}");
    }
}
