use axum::http::header::LOCATION;
use axum_test::TestResponse;
use serde_json::Value;

#[track_caller]
pub(crate) fn assert_redirect(response: &TestResponse, location: &str) {
    response.assert_status_see_other();
    assert_eq!(
        response
            .header(LOCATION)
            .to_str()
            .expect("Could not convert to str"),
        location
    );
}

#[track_caller]
pub(crate) fn get_error_message(response: &TestResponse) -> String {
    response.json::<Value>()["error"]
        .as_str()
        .expect("response has no error message")
        .to_owned()
}
