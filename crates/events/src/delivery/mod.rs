//! External delivery channels layered over a [`NotificationStore`](crate::ports::NotificationStore).

pub mod sms;
