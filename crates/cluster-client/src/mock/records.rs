//! Records of operations performed against the mock

/// Operation kinds, used for write records and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Read (never recorded, only used for failure injection)
    Get,
    /// Read (never recorded, only used for failure injection)
    List,
    Create,
    Replace,
    Patch,
    PatchStatus,
    Delete,
}

/// A write performed against the mock cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Operation
    pub verb: Verb,

    /// Resource kind (e.g. "Deployment")
    pub kind: String,

    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,

    /// Object name
    pub name: String,
}

impl WriteRecord {
    /// Whether this record is a write of `verb` on `kind`
    pub fn is(&self, verb: Verb, kind: &str) -> bool {
        self.verb == verb && self.kind == kind
    }
}
