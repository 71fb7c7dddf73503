// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Exceptions that unwind across await boundaries.
//!
//! An async function that can throw returns `Result<T, Exception>`; the `?`
//! on an awaited call is the unwinding step, and the `Drop` impls of frame
//! locals run in reverse call order as each frame returns. Catching is
//! ordinary matching at the call site of your choice: [`catch`] wraps a
//! throwing future into a [`Caught`] verdict without unwinding further.
//!
//! Exception *types* are singletons: two types are the same exception exactly
//! when they point at the same [`ExceptionDef`]. The definition only carries a
//! diagnostic name. Declare new ones with [`define_exception!`].

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The static definition an [`ExceptionType`] points at.
#[derive(Debug)]
pub struct ExceptionDef {
    pub name: &'static str,
}

/// A singleton exception type, identified by the address of its definition.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionType(&'static ExceptionDef);

impl ExceptionType {
    #[must_use]
    pub const fn new(def: &'static ExceptionDef) -> Self { Self(def) }

    #[must_use]
    pub fn name(&self) -> &'static str { self.0.name }
}

impl PartialEq for ExceptionType {
    fn eq(&self, other: &Self) -> bool { std::ptr::eq(self.0, other.0) }
}

impl Eq for ExceptionType {}

impl Display for ExceptionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

/// Declares an exception type singleton. Prefix with `pub` to export it.
///
/// ```rust
/// use coros_kernel::define_exception;
///
/// define_exception!(PARSE_ERROR);
/// assert_eq!(PARSE_ERROR.name(), "PARSE_ERROR");
/// ```
#[macro_export]
macro_rules! define_exception {
    ($name:ident) => {
        static $name: $crate::kernel::exception::ExceptionType =
            $crate::kernel::exception::ExceptionType::new(
                &$crate::kernel::exception::ExceptionDef { name: stringify!($name) },
            );
    };
    (pub $name:ident) => {
        pub static $name: $crate::kernel::exception::ExceptionType =
            $crate::kernel::exception::ExceptionType::new(
                &$crate::kernel::exception::ExceptionDef { name: stringify!($name) },
            );
    };
}

static ERROR_DEF: ExceptionDef = ExceptionDef { name: "Error" };

/// The predeclared generic error type.
pub static ERROR: ExceptionType = ExceptionType::new(&ERROR_DEF);

/// A thrown value: an exception type plus one word of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{ty}({value})")]
pub struct Exception {
    pub ty: ExceptionType,
    pub value: isize,
}

impl Exception {
    #[must_use]
    pub fn new(ty: ExceptionType, value: isize) -> Self { Self { ty, value } }

    #[must_use]
    pub fn is(&self, ty: ExceptionType) -> bool { self.ty == ty }
}

/// Throws: shorthand for `Err(Exception::new(ty, value))`.
pub fn throw<T>(ty: ExceptionType, value: isize) -> Result<T, Exception> {
    Err(Exception::new(ty, value))
}

/// The verdict of a [`catch`]ed call.
#[derive(Debug)]
pub enum Caught<T> {
    Ok(T),
    Thrown(Exception),
}

impl<T> Caught<T> {
    #[must_use]
    pub fn success(&self) -> bool { matches!(self, Caught::Ok(_)) }

    #[must_use]
    pub fn exception(&self) -> Option<Exception> {
        match self {
            Caught::Ok(_) => None,
            Caught::Thrown(e) => Some(*e),
        }
    }

    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Caught::Ok(v) => Some(v),
            Caught::Thrown(_) => None,
        }
    }
}

/// Intercepts a thrown result at this call site instead of unwinding further.
pub async fn catch<T>(fut: impl Future<Output = Result<T, Exception>>) -> Caught<T> {
    match fut.await {
        Ok(v) => Caught::Ok(v),
        Err(e) => Caught::Thrown(e),
    }
}
