//! Concrete delivery channels.
//!
//! The engine only depends on the [`EmailSender`](crate::sources::EmailSender)
//! seam; this module provides the production SMTP implementation.

pub mod email;
