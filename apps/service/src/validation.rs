use url::Url;

/// Longest interval a tenant may configure (24 hours)
pub const MAX_INTERVAL_SECONDS: i64 = 86_400;

/// Validation results with specific error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    /// Error text, or a generic one for a valid result
    pub fn message(&self) -> &str {
        self.error.as_deref().unwrap_or("Validation failed")
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    let target = target.trim();
    if target.is_empty() {
        return ValidationResult::err("URL cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none_or(str::is_empty) {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

/// Validate an endpoint display name
pub fn validate_endpoint_name(name: &str) -> ValidationResult {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return ValidationResult::err("Name cannot be empty");
    }

    if trimmed.chars().count() > 100 {
        return ValidationResult::err("Name too long (max 100 characters)");
    }

    ValidationResult::ok()
}

/// Validate a check interval in seconds
pub fn validate_interval(interval: i64) -> ValidationResult {
    if interval < 1 {
        return ValidationResult::err("Interval must be at least 1 second");
    }

    if interval > MAX_INTERVAL_SECONDS {
        return ValidationResult::err("Interval too long (max 24 hours)");
    }

    ValidationResult::ok()
}

/// Parse and validate an interval argument
pub fn parse_interval(arg: &str) -> Result<i64, ValidationResult> {
    let interval: i64 = arg
        .trim()
        .parse()
        .map_err(|_| ValidationResult::err(format!("'{}' is not a whole number of seconds", arg.trim())))?;

    let result = validate_interval(interval);
    if result.is_valid { Ok(interval) } else { Err(result) }
}
