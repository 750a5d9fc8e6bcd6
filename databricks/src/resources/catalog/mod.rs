pub mod resource_function;

pub use resource_function::{FunctionModel, FunctionResource};
