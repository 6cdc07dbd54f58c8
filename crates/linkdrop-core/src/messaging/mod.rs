//! Outbound chat abstractions (Telegram today).

pub mod port;
