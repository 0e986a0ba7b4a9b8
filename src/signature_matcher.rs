use crate::db::{Database, Label};
use crate::signature::Signature;

pub struct SignatureMatcher<'a> {
    database: &'a Database,
}

impl<'a> SignatureMatcher<'a> {
    pub fn new(database: &'a Database) -> Self {
        Self { database }
    }

    /// First entry whose signature equals `signature` field for field.
    pub fn matching_by_signature(
        &self,
        signature: &Signature,
    ) -> Option<(&'a Label, &'a Signature)> {
        if signature.is_empty() {
            return None;
        }

        self.database.os.iter().find_map(|(label, signatures)| {
            signatures
                .iter()
                .find(|candidate| *candidate == signature)
                .map(|candidate| (label, candidate))
        })
    }
}
