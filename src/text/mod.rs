pub mod string;

pub use string::{Span, XbfStr};
