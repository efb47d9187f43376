//! Integrations that rely on third-party services.
//!
//! This module groups adapters for the CAPTCHA solving services that bridge
//! the deletion pipeline with the outside world.

pub mod captcha;

pub use captcha::{AntiCaptchaProvider, CaptchaProvider, TwoCaptchaProvider};
