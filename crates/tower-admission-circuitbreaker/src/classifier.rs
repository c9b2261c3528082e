/// Decides whether a completed call counts as a failure.
///
/// The default treats any `Err` as a failure and any `Ok` as a success.
/// Custom classifiers can inspect the response, for example to count HTTP
/// 5xx responses as failures while letting 4xx pass.
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Returns `true` if the call outcome should count as a failure.
    fn is_failure(&self, result: &Result<Res, Err>) -> bool;
}

/// Classifies every `Err` as a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err> FailureClassifier<Res, Err> for DefaultClassifier {
    fn is_failure(&self, result: &Result<Res, Err>) -> bool {
        result.is_err()
    }
}

/// A function-based classifier.
pub struct FnClassifier<F> {
    f: F,
}

impl<F> FnClassifier<F> {
    /// Creates a classifier from a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<Res, Err, F> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> bool + Send + Sync,
{
    fn is_failure(&self, result: &Result<Res, Err>) -> bool {
        (self.f)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classifier_counts_errors() {
        let classifier = DefaultClassifier;
        let ok: Result<u32, &str> = Ok(1);
        let err: Result<u32, &str> = Err("boom");
        assert!(!FailureClassifier::is_failure(&classifier, &ok));
        assert!(FailureClassifier::is_failure(&classifier, &err));
    }

    #[test]
    fn fn_classifier_inspects_responses() {
        // Treat status codes >= 500 as failures even when Ok.
        let classifier = FnClassifier::new(|result: &Result<u16, &str>| match result {
            Ok(status) => *status >= 500,
            Err(_) => true,
        });
        assert!(classifier.is_failure(&Ok(503)));
        assert!(!classifier.is_failure(&Ok(404)));
        assert!(classifier.is_failure(&Err("io")));
    }
}
