pub mod availability;
pub mod booking;
pub mod cleanup;
pub mod notification;
pub mod payment;
pub mod webhook;
