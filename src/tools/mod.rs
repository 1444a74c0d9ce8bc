pub mod employee_lookup;
pub mod executor;
pub mod registry;
pub mod schema;

pub use employee_lookup::{EmployeeLookupTool, LookupSettings, TOOL_NAME as EMPLOYEE_LOOKUP};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use schema::{lookup_args_schema, LookupArgs};
