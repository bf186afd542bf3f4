use crate::position::{FileLine, ThreadPos};

/// One thread's replay bookkeeping: where it currently is, the file/line
/// it last finished at (used to recognize "no-op" middle-of-line
/// records), and the last target it was asked to reach (used to collapse
/// runs of strictly-increasing `Before` records on the same file into a
/// single `run_until`).
pub struct ThreadInfo {
    pub current: ThreadPos,
    pub last_finished: Option<FileLine>,
    pub last_target: Option<FileLine>,
}

impl ThreadInfo {
    pub fn new(current: ThreadPos) -> Self {
        ThreadInfo {
            current,
            last_finished: None,
            last_target: None,
        }
    }
}
