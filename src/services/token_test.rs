use super::*;

const SECRET: &[u8] = b"board-secret";

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[test]
fn generated_token_verifies() {
    let service = JwtTokenService::new(SECRET, 24);
    let user_id = Uuid::new_v4();
    let token = service.generate(user_id).unwrap();
    assert_eq!(service.verify(&token).unwrap(), user_id);
}

#[test]
fn wrong_secret_is_rejected() {
    let token = JwtTokenService::new(SECRET, 24).generate(Uuid::new_v4()).unwrap();
    let other = JwtTokenService::new(b"another-secret", 24);
    assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
}

#[test]
fn expired_token_is_rejected() {
    let service = JwtTokenService::new(SECRET, 24);
    let token = service.issue(Uuid::new_v4().to_string(), now() - 3600).unwrap();
    assert!(matches!(service.verify(&token), Err(TokenError::Invalid(_))));
}

#[test]
fn empty_subject_is_rejected() {
    let service = JwtTokenService::new(SECRET, 24);
    let token = service.issue(String::new(), now() + 3600).unwrap();
    assert!(matches!(service.verify(&token), Err(TokenError::BadSubject)));
}

#[test]
fn non_uuid_subject_is_rejected() {
    let service = JwtTokenService::new(SECRET, 24);
    let token = service.issue("user-1".into(), now() + 3600).unwrap();
    assert!(matches!(service.verify(&token), Err(TokenError::BadSubject)));
}

#[test]
fn garbage_is_rejected() {
    let service = JwtTokenService::new(SECRET, 24);
    assert!(service.verify("not.a.jwt").is_err());
}

#[test]
fn lifetime_beyond_window_is_rejected() {
    let service = JwtTokenService::new(SECRET, 1);
    let token = service.issue(Uuid::new_v4().to_string(), now() + 48 * 3600).unwrap();
    assert!(matches!(service.verify(&token), Err(TokenError::LifetimeTooLong { max_secs: 3600 })));
}

#[test]
fn lifetime_within_window_is_accepted() {
    let service = JwtTokenService::new(SECRET, 24);
    let user_id = Uuid::new_v4();
    let token = service.issue(user_id.to_string(), now() + 23 * 3600).unwrap();
    assert_eq!(service.verify(&token).unwrap(), user_id);
}
