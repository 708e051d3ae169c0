use crate::error::{DispatchError, ErrorCode, RequestError};
use crate::response::NormalizedResponse;
use std::sync::Arc;

/// Decides whether a completed response resolves or rejects the dispatch
pub trait SettlementPolicy: Send + Sync {
    /// # Errors
    /// Returns the rejection for responses the policy does not accept.
    fn settle(&self, response: NormalizedResponse) -> Result<NormalizedResponse, DispatchError>;
}

/// Status-code based settlement
///
/// Uses the descriptor's `validate_status` when present, otherwise accepts
/// 2xx. Rejections carry the response and a code derived from the status
/// class: `ERR_BAD_REQUEST` for 4xx, `ERR_BAD_RESPONSE` for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateStatus;

impl SettlementPolicy for ValidateStatus {
    fn settle(&self, response: NormalizedResponse) -> Result<NormalizedResponse, DispatchError> {
        let accepted = match &response.config.validate_status {
            Some(validate) => validate(response.status),
            None => (200..300).contains(&response.status),
        };
        if accepted {
            return Ok(response);
        }

        let code = if (400..500).contains(&response.status) {
            ErrorCode::BadRequest
        } else {
            ErrorCode::BadResponse
        };
        let err = RequestError::new(
            format!("Request failed with status code {}", response.status),
            Arc::clone(&response.config),
            Some(code),
            Some(response.request.clone()),
        )
        .with_response(response);
        Err(err.into())
    }
}

impl<F> SettlementPolicy for F
where
    F: Fn(NormalizedResponse) -> Result<NormalizedResponse, DispatchError> + Send + Sync,
{
    fn settle(&self, response: NormalizedResponse) -> Result<NormalizedResponse, DispatchError> {
        self(response)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::cancel::AbortController;
    use crate::descriptor::RequestDescriptor;
    use crate::response::{RequestHandle, ResponseData};
    use crate::transport::CredentialsMode;
    use http::{HeaderMap, Method};

    fn response(status: u16, descriptor: RequestDescriptor) -> NormalizedResponse {
        NormalizedResponse {
            data: ResponseData::Text(String::new()),
            status,
            status_text: String::new(),
            headers: HeaderMap::new(),
            config: Arc::new(descriptor),
            request: RequestHandle::new(
                Method::GET,
                "https://a/x".to_owned(),
                HeaderMap::new(),
                CredentialsMode::Omit,
            ),
            signal: AbortController::new().signal(),
        }
    }

    #[test]
    fn test_2xx_resolves() {
        for status in [200, 204, 299] {
            let settled = ValidateStatus.settle(response(status, RequestDescriptor::new("get", "/x")));
            assert!(settled.is_ok(), "status {status} should resolve");
        }
    }

    #[test]
    fn test_4xx_rejects_with_bad_request() {
        let err = ValidateStatus
            .settle(response(404, RequestDescriptor::new("get", "/x")))
            .unwrap_err();

        assert_eq!(err.to_string(), "Request failed with status code 404");
        assert_eq!(err.code(), Some(ErrorCode::BadRequest));
        let request_error = err.as_request_error().unwrap();
        assert_eq!(request_error.response.as_ref().unwrap().status, 404);
        assert!(request_error.request.is_some());
    }

    #[test]
    fn test_5xx_and_3xx_reject_with_bad_response() {
        for status in [500, 503, 304] {
            let err = ValidateStatus
                .settle(response(status, RequestDescriptor::new("get", "/x")))
                .unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::BadResponse));
        }
    }

    #[test]
    fn test_custom_validator() {
        let descriptor = RequestDescriptor::new("get", "/x").validate_status(|s| s < 500);
        assert!(ValidateStatus.settle(response(404, descriptor)).is_ok());
    }

    #[test]
    fn test_closure_policy() {
        let accept_all = |r: NormalizedResponse| -> Result<NormalizedResponse, DispatchError> { Ok(r) };
        assert!(accept_all.settle(response(500, RequestDescriptor::new("get", "/x"))).is_ok());
    }
}
