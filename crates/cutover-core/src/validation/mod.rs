//! Data validation.
//!
//! A [`ValidationSuite`] is a named list of [`Check`]s run by the
//! [`DataValidator`]. Findings are data, not errors: each check yields a
//! [`ValidationResult`] with status `pass`, `fail` or `warning`, and the suite
//! folds them into a [`SuiteStatus`].

mod check;
mod result;
mod validator;

pub use check::{Check, CheckKind, Severity};
pub use result::{SuiteStatus, ValidationResult, ValidationStatus, ValidationSuite};
pub use validator::{DataValidator, EVENT_SUITE, USER_SUITE, WECHAT_USER_SUITE};
