//! vritual — shared symbolic state engine daemon and CLI

pub mod daemon;
