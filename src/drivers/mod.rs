//! Device drivers, one module per peripheral family.

pub mod skydimo;
