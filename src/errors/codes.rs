//! Canonical error codes.

// Parse / validation (400)
pub const HEADER_ABSENT: &str = "HEADER_ABSENT";
pub const JSON_ABSENT: &str = "JSON_ABSENT";
pub const VALIDATION_FAILED: &str = "Validation Failed";
pub const HEADER_VALIDATION_FAILED: &str = "Header Validation Failed";
pub const REQUIRED_FIELD: &str = "REQUIRED-FIELD";
pub const INVALID_INPUT_DATA: &str = "INVALID-INPUT-DATA";

// Request log
pub const DUPLICATE_REQUEST: &str = "DUPLICATE_REQUEST";

// Authorization
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const FORBIDDEN: &str = "FORBIDDEN";

// Domain
pub const NO_DATA_FOUND: &str = "NO_DATA_FOUND";
pub const DUPLICATE_FOUND: &str = "DUPLICATE_FOUND";

// Database infrastructure (500)
pub const DB_READ_ERROR: &str = "DB_READ_ERROR";
pub const ERROR_CALLING_DB_FUNCTION: &str = "ERROR_CALLING_DB_FUNCTION";
pub const UNABLE_TO_QUERY_STATEMENT: &str = "UNABLE_TO_QUERY_STATEMENT";
pub const UNABLE_TO_INITIALIZE_STATEMENT: &str = "UNABLE_TO_INITIALIZE_STATEMENT";
pub const UNABLE_TO_GET_COLUMN_TYPES: &str = "UNABLE_TO_GET_COLUMN_TYPES";
pub const UNABLE_TO_GET_SCAN_ROW: &str = "UNABLE_TO_GET_SCAN_ROW";
pub const PARSE_DB_RESP_ERROR: &str = "PARSE_DB_RESP_ERROR";
pub const DB_NOT_CONFIGURED: &str = "DB_NOT_CONFIGURED";

// Remote calls
pub const REMOTE_CALL_ERROR: &str = "REMOTE_CALL_ERROR";
pub const API_CONNECT_TIMED_OUT: &str = "API_CONNECT_TIMED_OUT";
pub const API_READ_TIMED_OUT: &str = "API_READ_TIMED_OUT";
pub const API_UNABLE_TO_CALL: &str = "API_UNABLE_TO_CALL";
pub const API_UNABLE_TO_READ: &str = "API_UNABLE_TO_READ";
pub const API_NOK: &str = "API_NOK";
pub const API_NOT_FOUND: &str = "API_NOT_FOUND";
pub const API_AUTH_FAILED: &str = "API_AUTH_FAILED";

// Faults and local state (500)
pub const SYSTEM_FAULT: &str = "SYSTEM_FAULT";
pub const SYSTEM_FAULT_DESC: &str = "SYSTEM_FAULT_DESC";
pub const BAD_LOCAL_HEADERS: &str = "BAD_LOCAL_HEADERS";
pub const COMMAND_ARGUMENT_ERROR: &str = "COMMAND_ARGUMENT_ERROR";
pub const RESPONSE_ENCODING_ERROR: &str = "RESPONSE_ENCODING_ERROR";

// Files
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
pub const FILE_SAVE_ERROR: &str = "FILE_SAVE_ERROR";
pub const INVALID_FILE_NAME: &str = "INVALID_FILE_NAME";

// Crypto
pub const CRYPTO_ERROR: &str = "CRYPTO_ERROR";

/// Code used for foreign errors wrapped by `Error::child_err`.
pub const ERROR_CAUSE: &str = "ERROR_CAUSE";
