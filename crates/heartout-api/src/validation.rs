//! Input checks shared by the handlers. Each returns `ApiError::Validation`
//! carrying the message shown to the user.

use heartout_types::models::AGE_RANGES;

use crate::error::ApiError;

pub const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
pub const MAX_TAGS: usize = 10;

fn invalid(msg: impl Into<String>) -> ApiError {
    ApiError::Validation(msg.into())
}

fn length_between(value: &str, field: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(invalid(format!("{} must be between {} and {} characters", field, min, max)));
    }
    Ok(())
}

pub fn username(name: &str) -> Result<(), ApiError> {
    length_between(name, "Username", 3, 80)?;
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("Username can only contain letters, numbers, and underscores"));
    }
    Ok(())
}

pub fn email(email: &str) -> Result<(), ApiError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid("Invalid email address"));
    };
    let domain_ok = domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) || email.len() > 254 {
        return Err(invalid("Invalid email address"));
    }
    Ok(())
}

pub fn password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(invalid("Password must be at least 8 characters"));
    }
    if password.chars().count() > 128 {
        return Err(invalid("Password must be at most 128 characters"));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(invalid("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(invalid("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain at least one digit"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(invalid("Password must contain at least one special character"));
    }
    Ok(())
}

pub fn age_range(range: Option<&str>) -> Result<(), ApiError> {
    match range {
        Some(r) if !AGE_RANGES.contains(&r) => Err(invalid("Invalid age range")),
        _ => Ok(()),
    }
}

pub fn display_name(name: Option<&str>) -> Result<(), ApiError> {
    match name {
        Some(n) if n.chars().count() > 100 => Err(invalid("Display name must be at most 100 characters")),
        _ => Ok(()),
    }
}

pub fn title(title: &str) -> Result<(), ApiError> {
    length_between(title.trim(), "Title", 5, 200)
}

pub fn content(content: &str) -> Result<(), ApiError> {
    length_between(content.trim(), "Content", 50, 50_000)
}

/// Trims, drops empties and checks count and charset.
pub fn tags(tags: &[String]) -> Result<Vec<String>, ApiError> {
    if tags.len() > MAX_TAGS {
        return Err(invalid(format!("At most {} tags are allowed", MAX_TAGS)));
    }
    let mut cleaned = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().count() > 30 {
            return Err(invalid("Each tag must be between 1 and 30 characters"));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(invalid(format!(
                "Tag \"{}\" contains invalid characters. Use only letters, numbers, underscores, and hyphens.",
                tag
            )));
        }
        cleaned.push(tag.to_string());
    }
    Ok(cleaned)
}

pub fn comment(content: &str) -> Result<(), ApiError> {
    length_between(content.trim(), "Comment", 1, 2000)
}

pub fn support_message(message: Option<&str>) -> Result<(), ApiError> {
    match message {
        Some(m) if m.chars().count() > 500 => Err(invalid("Message must be at most 500 characters")),
        _ => Ok(()),
    }
}

pub fn rating(rating: Option<i64>) -> Result<(), ApiError> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(invalid("Rating must be between 1 and 5")),
        _ => Ok(()),
    }
}
