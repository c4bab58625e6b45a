use crate::engine::Engine;
use crate::input::Input;
use crate::oracle::evaluate_bytes;

/// Corpus-retention signal consumed by a fuzz driver.
pub trait Feedback<I: Input>: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_interesting(&self, input: &I) -> bool;
}

/// Keeps samples whose recorded expectation the engine confirms.
///
/// Holds nothing but the engine, so one instance can serve any number of workers.
#[derive(Debug)]
pub struct OracleFeedback<E> {
    engine: E,
}

impl<E: Engine> OracleFeedback<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// go-fuzz entry point shape: 1 to keep the sample, 0 otherwise.
    pub fn score(&self, data: &[u8]) -> i32 {
        evaluate_bytes(data, &self.engine).score()
    }
}

impl<I, E> Feedback<I> for OracleFeedback<E>
where
    I: Input,
    E: Engine + Send + Sync,
{
    fn name(&self) -> &'static str {
        "OracleFeedback"
    }

    fn is_interesting(&self, input: &I) -> bool {
        evaluate_bytes(input.as_bytes(), &self.engine).is_interesting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::oracle::tests::FixedEngine;
    use crate::value::{Opts, Value};
    use std::sync::Arc;
    use std::thread;

    const CONFIRMED: &[u8] = b"Usage: prog <x>\n~~~\nprog y\n~~~\n{\"<x>\": \"y\"}";
    const MISMATCHED: &[u8] = b"Usage: prog <x>\n~~~\nprog y\n~~~\n{\"<x>\": \"z\"}";

    fn engine() -> FixedEngine {
        let mut opts = Opts::new();
        opts.insert("<x>".into(), Value::Str("y".into()));
        FixedEngine::new(Ok(opts))
    }

    #[test]
    fn oracle_feedback_keeps_only_confirmed_samples() {
        let feedback = OracleFeedback::new(engine());
        assert!(Feedback::<Vec<u8>>::is_interesting(&feedback, &CONFIRMED.to_vec()));
        assert!(!Feedback::<Vec<u8>>::is_interesting(&feedback, &MISMATCHED.to_vec()));
        assert!(!Feedback::<Vec<u8>>::is_interesting(&feedback, &b"junk".to_vec()));
        assert_eq!(Feedback::<Vec<u8>>::name(&feedback), "OracleFeedback");
    }

    #[test]
    fn score_follows_go_fuzz_convention() {
        let feedback = OracleFeedback::new(engine());
        assert_eq!(feedback.score(CONFIRMED), 1);
        assert_eq!(feedback.score(MISMATCHED), 0);

        let rejecting = OracleFeedback::new(FixedEngine::new(Err(EngineError::User("no".into()))));
        assert_eq!(rejecting.score(CONFIRMED), 0);
    }

    #[test]
    fn feedback_is_shareable_across_workers() {
        let feedback = Arc::new(OracleFeedback::new(engine()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let feedback = Arc::clone(&feedback);
                thread::spawn(move || {
                    let sample = if i % 2 == 0 { CONFIRMED } else { MISMATCHED };
                    (i, feedback.score(sample))
                })
            })
            .collect();

        for handle in handles {
            let (i, score) = handle.join().unwrap();
            assert_eq!(score, if i % 2 == 0 { 1 } else { 0 }, "worker {i}");
        }
    }
}
