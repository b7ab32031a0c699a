/// The first coordinate of every advisory-lock call this crate issues.
///
/// All cooperating workers and producers in one queue deployment must be
/// configured with the same `ClassId`; it is what lets several queue
/// deployments share a single database without their advisory locks
/// colliding. This is read once at startup from configuration and never
/// changes for the lifetime of the process - a mismatch across workers is
/// a configuration error this crate cannot detect at runtime (it would
/// just silently stop providing mutual exclusion), so treat it as
/// something to validate at deploy time, not something to code around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub i64);

impl ClassId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ClassId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
