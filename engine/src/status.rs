///
/// Status code vocabulary.
///
/// Procedure outcomes, carried as data on the call outcome. Business
/// codes are not errors: a lookup that finds nothing reports
/// `ROW_NOT_FOUND` with a clean return, and callers branch on it.
///

pub const OK: i32 = 0;
pub const ROW_NOT_FOUND: i32 = 1;
pub const CHECK_FAILED: i32 = 2;
