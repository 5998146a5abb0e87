use super::*;

fn create_input() -> CreatePostInput {
    CreatePostInput {
        user_id: Uuid::new_v4(),
        board_id: Uuid::new_v4(),
        content: "ship it".into(),
        pos_x: Some(10),
        pos_y: Some(20),
        color: Some("#ffeeaa".into()),
        height: 120,
        z_index: 1,
        post_order: None,
        post_group_id: None,
    }
}

fn message(err: PostError) -> String {
    match err {
        PostError::Validation(msg) => msg,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn valid_create_input_passes() {
    let post = create_input().validate().unwrap();
    assert_eq!(post.pos_x, 10);
    assert_eq!(post.color, "#ffeeaa");
}

#[test]
fn zero_positions_are_allowed() {
    let input = CreatePostInput { pos_x: Some(0), pos_y: Some(0), height: 0, ..create_input() };
    assert!(input.validate().is_ok());
}

#[test]
fn missing_position_is_required() {
    let input = CreatePostInput { pos_x: None, ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "pos_x is a required field");
}

#[test]
fn negative_position_is_invalid() {
    let input = CreatePostInput { pos_y: Some(-1), ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on pos_y");
}

#[test]
fn short_color_is_invalid() {
    let input = CreatePostInput { color: Some("#abc".into()), ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on color");
}

#[test]
fn empty_color_is_required() {
    let input = CreatePostInput { color: Some(String::new()), ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "color is a required field");
}

#[test]
fn z_index_must_be_positive() {
    let input = CreatePostInput { z_index: 0, ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on z_index");
}

#[test]
fn first_failing_field_wins() {
    let input = CreatePostInput { pos_x: Some(-5), color: Some("#abc".into()), z_index: 0, ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on pos_x");
}

#[test]
fn update_requires_id() {
    let input = UpdatePostInput::default();
    assert_eq!(message(input.validate().unwrap_err()), "id is a required field");
}

#[test]
fn update_rejects_non_uuid_id() {
    let input = UpdatePostInput { id: Some("post-1".into()), ..UpdatePostInput::default() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on id");
}

#[test]
fn update_checks_only_present_fields() {
    let id = Uuid::new_v4();
    let input = UpdatePostInput { id: Some(id.to_string()), content: Some(String::new()), ..UpdatePostInput::default() };
    assert_eq!(input.validate().unwrap(), PostTarget { id, post_group_id: None });

    let input = UpdatePostInput { id: Some(id.to_string()), height: Some(-3), ..UpdatePostInput::default() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on height");
}

#[test]
fn post_serializes_rfc3339_timestamps() {
    let post = Post {
        id: Uuid::new_v4(),
        board_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        post_group_id: Uuid::new_v4(),
        content: String::new(),
        pos_x: 0,
        pos_y: 0,
        color: "#000000".into(),
        height: 0,
        z_index: 1,
        post_order: 1.5,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    };
    let value = serde_json::to_value(&post).unwrap();
    assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
    assert_eq!(value["z_index"], 1);
}

#[test]
fn post_order_defaults_when_unset_or_zero() {
    assert_eq!(create_input().validate().unwrap().post_order, DEFAULT_POST_ORDER);
    let input = CreatePostInput { post_order: Some(0.0), ..create_input() };
    assert_eq!(input.validate().unwrap().post_order, DEFAULT_POST_ORDER);
    let input = CreatePostInput { post_order: Some(2.5), ..create_input() };
    assert_eq!(input.validate().unwrap().post_order, 2.5);
}

#[test]
fn negative_post_order_is_invalid() {
    let input = CreatePostInput { post_order: Some(-1.0), ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on post_order");
}

#[test]
fn create_post_group_id_is_optional_but_must_be_uuid() {
    let input = CreatePostInput { post_group_id: Some(String::new()), ..create_input() };
    assert_eq!(input.validate().unwrap().post_group_id, None);

    let group_id = Uuid::new_v4();
    let input = CreatePostInput { post_group_id: Some(group_id.to_string()), ..create_input() };
    assert_eq!(input.validate().unwrap().post_group_id, Some(group_id));

    let input = CreatePostInput { post_group_id: Some("group-1".into()), ..create_input() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on post_group_id");
}

#[test]
fn update_parses_target_group() {
    let id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let input = UpdatePostInput {
        id: Some(id.to_string()),
        post_group_id: Some(group_id.to_string()),
        ..UpdatePostInput::default()
    };
    assert_eq!(input.validate().unwrap(), PostTarget { id, post_group_id: Some(group_id) });
}

#[test]
fn group_update_requires_id() {
    let input = UpdatePostGroupInput::default();
    assert_eq!(message(input.validate().unwrap_err()), "id is a required field");
}

#[test]
fn group_update_checks_present_fields() {
    let id = Uuid::new_v4();
    let input = UpdatePostGroupInput { id: Some(id.to_string()), title: Some("Ideas".into()), ..UpdatePostGroupInput::default() };
    assert_eq!(input.validate().unwrap(), id);

    let input = UpdatePostGroupInput { id: Some(id.to_string()), z_index: Some(0), ..UpdatePostGroupInput::default() };
    assert_eq!(message(input.validate().unwrap_err()), "Invalid input on z_index");
}
