use regex::RegexSet;

/// Verdict over the captured output of one broker client run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub success: bool,
    pub marker: Option<String>,
    /// Error phrases found in the output. Annotation only, never changes `success`.
    pub suspected_causes: Vec<String>,
}

/// Decides whether a delivery worked from the client's output.
///
/// The client's exit code is not reliable (disconnect can fail after a good send),
/// so implementations look at the text only.
pub trait OutcomeClassifier: Send + Sync {
    fn classify(&self, output: &str) -> Verdict;
}

/// Success when any marker phrase appears verbatim; error patterns are matched
/// case-insensitively to explain failures.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
    patterns: Vec<String>,
    errors: RegexSet,
}

impl MarkerClassifier {
    pub fn new(markers: Vec<String>, patterns: Vec<String>) -> Result<Self, regex::Error> {
        let errors = RegexSet::new(
            patterns
                .iter()
                .map(|p| format!("(?i){}", regex::escape(p))),
        )?;
        Ok(Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
            patterns,
            errors,
        })
    }
}

impl OutcomeClassifier for MarkerClassifier {
    fn classify(&self, output: &str) -> Verdict {
        if let Some(marker) = self.markers.iter().find(|m| output.contains(m.as_str())) {
            return Verdict {
                success: true,
                marker: Some(marker.clone()),
                suspected_causes: Vec::new(),
            };
        }
        Verdict {
            success: false,
            marker: None,
            suspected_causes: self
                .errors
                .matches(output)
                .into_iter()
                .map(|i| self.patterns[i].clone())
                .collect(),
        }
    }
}
