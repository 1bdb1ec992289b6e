//! Daybreak CheckMail: polls a mailbox for daybreak report emails and
//! stages complete reports.

pub mod archive;
pub mod checkmail;
pub mod config;
pub mod daybreak;
pub mod error;
pub mod mail;
pub mod scheduler;
pub mod staging;
