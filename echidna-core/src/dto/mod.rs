//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used between the HTTP boundary and its clients.

pub mod request;
