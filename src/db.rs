use crate::error::HuginnNetProbeError;
use crate::signature::Signature;
use std::fmt;

/// Static table mapping exact signatures to operating system labels.
#[derive(Debug, Default, PartialEq)]
pub struct Database {
    pub os: Vec<(Label, Vec<Signature>)>,
}

/// Operating system a signature belongs to, in `type:class:name:flavor` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub ty: Type,
    pub class: Option<String>,
    pub name: String,
    pub flavor: Option<String>,
}

/// - `Specified`: the signature identifies a specific system.
/// - `Generic`: the signature is shared by a family of systems.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Specified,
    Generic,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.name,
            self.class.as_deref().unwrap_or("???"),
            self.flavor.as_deref().unwrap_or("??")
        )
    }
}

impl Database {
    /// Parses the bundled `config/os.fp` table.
    pub fn load_default() -> Result<Self, HuginnNetProbeError> {
        include_str!("../config/os.fp").parse()
    }

    pub fn len(&self) -> usize {
        self.os.iter().map(|(_, signatures)| signatures.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
