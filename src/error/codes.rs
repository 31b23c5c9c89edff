/// Error code registry for Stepline
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Environment and mode errors
/// - 3000-3999: Step library errors
/// - 4000-4999: Execution errors
/// - 5000-5999: Workflow errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_ENTRY: u16 = 1003;
    pub const CONFIG_WORKFLOW_NOT_FOUND: u16 = 1004;
    pub const CONFIG_CIRCULAR_WORKFLOW: u16 = 1005;
    pub const CONFIG_INVALID_STEP: u16 = 1006;

    // Environment errors (2000-2999)
    pub const ENV_INVALID_BOOL: u16 = 2001;

    // Step library errors (3000-3999)
    pub const STEPLIB_UNKNOWN_LIBRARY: u16 = 3001;
    pub const STEPLIB_STEP_NOT_FOUND: u16 = 3002;
    pub const STEPLIB_VERSION_NOT_FOUND: u16 = 3003;
    pub const STEPLIB_INVALID_CONSTRAINT: u16 = 3004;
    pub const STEPLIB_UNSUPPORTED_CONSTRAINT: u16 = 3005;
    pub const STEPLIB_INVALID_REFERENCE: u16 = 3006;
    pub const STEPLIB_STAGING_FAILED: u16 = 3007;
    pub const STEPLIB_INVALID_METADATA: u16 = 3008;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_SPAWN_FAILED: u16 = 4003;
    pub const EXEC_OUTPUT_ERROR: u16 = 4004;
    pub const EXEC_TIMEOUT: u16 = 4006;

    // Workflow errors (5000-5999)
    pub const WORKFLOW_GENERIC: u16 = 5000;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_INVALID_YAML => "Configuration file is not valid YAML",
        ErrorCode::CONFIG_INVALID_ENTRY => "Environment entry is malformed",
        ErrorCode::CONFIG_WORKFLOW_NOT_FOUND => "Workflow is not defined in the configuration",
        ErrorCode::CONFIG_CIRCULAR_WORKFLOW => "Workflows reference each other in a cycle",
        ErrorCode::CONFIG_INVALID_STEP => "Step declaration is malformed",
        ErrorCode::ENV_INVALID_BOOL => "Value cannot be parsed as a boolean",
        ErrorCode::STEPLIB_UNKNOWN_LIBRARY => "Step library source is not known",
        ErrorCode::STEPLIB_STEP_NOT_FOUND => "Step is not published in the library",
        ErrorCode::STEPLIB_VERSION_NOT_FOUND => "No published version satisfies the constraint",
        ErrorCode::STEPLIB_INVALID_CONSTRAINT => "Version constraint is malformed",
        ErrorCode::STEPLIB_UNSUPPORTED_CONSTRAINT => "Version constraint is not supported",
        ErrorCode::STEPLIB_INVALID_REFERENCE => "Step reference is malformed",
        ErrorCode::STEPLIB_STAGING_FAILED => "Step files could not be staged",
        ErrorCode::STEPLIB_INVALID_METADATA => "Step metadata document is invalid",
        ErrorCode::EXEC_COMMAND_NOT_FOUND => "Command not found",
        ErrorCode::EXEC_SPAWN_FAILED => "Subprocess could not be spawned",
        ErrorCode::EXEC_OUTPUT_ERROR => "Subprocess output could not be read",
        ErrorCode::EXEC_TIMEOUT => "Subprocess exceeded its time limit",
        c if (1000..2000).contains(&c) => "Configuration error",
        c if (2000..3000).contains(&c) => "Environment error",
        c if (3000..4000).contains(&c) => "Step library error",
        c if (4000..5000).contains(&c) => "Execution error",
        c if (5000..6000).contains(&c) => "Workflow error",
        _ => "Unknown error",
    }
}
