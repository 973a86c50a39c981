use std::fmt;

/// Collection of independent errors reported together, e.g., all the
/// field-level failures of a single payload validation.
#[derive(Debug, Default)]
pub struct IndividualErrorList {
    list: Vec<anyhow::Error>,
}

impl IndividualErrorList {
    pub fn push(&mut self, err: anyhow::Error) { self.list.push(err); }

    pub fn is_empty(&self) -> bool { self.list.is_empty() }

    pub fn len(&self) -> usize { self.list.len() }
}

impl fmt::Display for IndividualErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.list {
            writeln!(f, "- {}", err)?;
        }
        Ok(())
    }
}
