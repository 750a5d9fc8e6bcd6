//! Unity Catalog API endpoints

pub mod functions;

pub use functions::{
    CreateFunction, CreateFunctionRequest, FunctionInfo, FunctionParameterInfo,
    FunctionParameterInfos, FunctionsApi, UpdateFunction,
};
