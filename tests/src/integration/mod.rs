//! Cross-module assembly flows

pub mod flows;
