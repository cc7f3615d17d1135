use cosmwasm_schema::cw_serde;
use thiserror::Error;

pub const RESULT_OK: u16 = 200;
pub const RESULT_BAD_REQUEST: u16 = 400;
pub const RESULT_SERVER_ERROR: u16 = 500;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResultError {
    #[error("Response result is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Response result code {0} is not supported")]
    UnsupportedCode(u16),

    #[error("Output must be set for successful responses and empty otherwise")]
    OutputMismatch,
}

/// The result envelope a provider attaches to each response
#[cw_serde]
pub struct ResponseResult {
    pub code: u16,
    pub message: String,
}

impl ResponseResult {
    pub fn parse(raw: &str) -> Result<Self, ResultError> {
        let result: ResponseResult = cosmwasm_std::from_json(raw.as_bytes())
            .map_err(|err| ResultError::InvalidJson(err.to_string()))?;
        match result.code {
            RESULT_OK | RESULT_BAD_REQUEST | RESULT_SERVER_ERROR => Ok(result),
            code => Err(ResultError::UnsupportedCode(code)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == RESULT_OK
    }

    /// A successful response carries an output, a failed one must not.
    pub fn check_output(&self, output: &str) -> Result<(), ResultError> {
        if self.is_success() == output.is_empty() {
            return Err(ResultError::OutputMismatch);
        }
        Ok(())
    }
}
