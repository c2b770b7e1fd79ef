use crate::manager::ManagerError;
use std::fmt;

/// Failures collected from every manager during one lifecycle pass.
///
/// An empty pass is not represented here: [`MultiError::from_errors`] returns
/// `Ok(())` when nothing failed.
#[derive(Debug)]
pub enum MultiError {
    Single(ManagerError),
    Multiple(Vec<ManagerError>),
}

impl MultiError {
    pub fn from_errors(mut errors: Vec<ManagerError>) -> Result<(), MultiError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(MultiError::Single(errors.remove(0))),
            _ => Err(MultiError::Multiple(errors)),
        }
    }

    /// Underlying failures in the order the managers reported them.
    pub fn errors(&self) -> &[ManagerError] {
        match self {
            MultiError::Single(err) => std::slice::from_ref(err),
            MultiError::Multiple(errs) => errs,
        }
    }

    pub fn len(&self) -> usize {
        self.errors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors().is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiError::Single(err) => write!(f, "{err}"),
            MultiError::Multiple(errs) => {
                let joined = errs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "multiple errors: {joined}")
            }
        }
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MultiError::Single(err) => Some(err.as_ref()),
            MultiError::Multiple(_) => None,
        }
    }
}
