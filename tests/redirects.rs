//! Redirect-following behavior: method rewriting, location resolution,
//! header stripping, cookies across hops and the loop limit.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use loopback_http::{Exchange, LoopbackTransport, ProblemDetails};

#[tokio::test]
async fn absolute_redirects_resolve_to_the_target() {
    for code in [301, 302, 303, 307] {
        let transport = common::redirect_transport();
        let response = transport
            .send(common::get(&format!("http://localhost/redirect-{code}-absolute")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "status {code}");
        assert_eq!(common::effective(&response).uri, "http://localhost/target");
    }
}

#[tokio::test]
async fn relative_redirects_resolve_against_the_previous_hop() {
    for code in [301, 302, 303, 307] {
        let transport = common::redirect_transport();
        let response = transport
            .send(common::get(&format!("http://localhost/redirect-{code}-relative")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "status {code}");
        assert_eq!(common::effective(&response).uri, "http://localhost/target");
    }
}

#[tokio::test]
async fn redirect_to_get_class_rewrites_the_method() {
    for code in [301, 302, 303] {
        let transport = common::redirect_transport();
        let response = transport
            .send(common::request(
                Method::POST,
                &format!("http://localhost/redirect-{code}-absolute"),
                "payload",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "status {code}");
        assert_eq!(common::effective(&response).method, Method::GET);
    }
}

#[tokio::test]
async fn temporary_redirect_preserves_a_bodyless_method() {
    let transport = common::redirect_transport();
    let response = transport
        .send(common::request(
            Method::HEAD,
            "http://localhost/redirect-307-absolute",
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::effective(&response).method, Method::HEAD);
    assert_eq!(common::effective(&response).uri, "http://localhost/target");
}

#[tokio::test]
async fn temporary_redirect_is_not_followed_for_post() {
    let transport = common::redirect_transport();
    let response = transport
        .send(common::request(
            Method::POST,
            "http://localhost/redirect-307-absolute",
            "the-body",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        common::effective(&response).uri,
        "http://localhost/redirect-307-absolute"
    );
}

#[tokio::test]
async fn redirects_are_terminal_when_auto_redirect_is_disabled() {
    let transport = LoopbackTransport::new(common::redirect_fixture);
    let response = transport
        .send(common::get("http://localhost/redirect-301-absolute"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
}

#[tokio::test]
async fn request_headers_are_retained_across_redirects() {
    for (name, value) in [
        ("accept", "application/json"),
        ("accept-charset", "utf-8"),
        ("cache-control", "no-cache"),
        ("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:12.0) Gecko/20100101 Firefox/21.0"),
    ] {
        let transport = common::redirect_transport();
        let mut request = common::get("http://localhost/redirect-301-absolute");
        request
            .headers_mut()
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            common::effective(&response).headers.get(name).unwrap(),
            value,
            "header {name}"
        );
    }
}

#[tokio::test]
async fn authorization_is_removed_on_redirect() {
    let transport = common::redirect_transport();
    let mut request = common::get("http://localhost/redirect-301-absolute");
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer foo"));

    let response = transport.send(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!common::effective(&response)
        .headers
        .contains_key(header::AUTHORIZATION));
}

#[tokio::test]
async fn body_is_replayed_on_the_next_hop() {
    let transport = common::redirect_transport();
    let response = transport
        .send(common::request(
            Method::POST,
            "http://localhost/redirect-302-absolute",
            "the-body",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::read_body(response).await.as_ref(), b"the-body");
}

#[tokio::test]
async fn cookies_set_on_a_redirect_are_passed_along() {
    for path in [
        "/redirect-302-absolute-setcookie",
        "/redirect-302-relative-setcookie",
    ] {
        let transport = common::redirect_transport();
        transport.use_cookies(true).unwrap();

        let response = transport
            .send(common::get(&format!("http://localhost{path}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "path {path}");
        let cookie = common::effective(&response)
            .headers
            .get(header::COOKIE)
            .expect("cookie attached to the followed hop");
        assert_eq!(cookie, "foo=bar");
    }
}

#[tokio::test]
async fn captured_cookies_persist_across_requests() {
    let transport = common::redirect_transport();
    transport.use_cookies(true).unwrap();

    transport
        .send(common::get("http://localhost/redirect-302-absolute-setcookie"))
        .await
        .unwrap();

    let response = transport
        .send(common::get("http://localhost/echo-cookie"))
        .await
        .unwrap();
    assert_eq!(common::read_body(response).await.as_ref(), b"foo=bar");
}

#[tokio::test]
async fn cookies_are_not_attached_when_disabled() {
    let transport = common::redirect_transport();

    transport
        .send(common::get("http://localhost/redirect-302-absolute-setcookie"))
        .await
        .unwrap();
    assert!(transport.cookie_jar().is_empty());

    let response = transport
        .send(common::get("http://localhost/echo-cookie"))
        .await
        .unwrap();
    assert!(common::read_body(response).await.is_empty());
}

#[tokio::test]
async fn redirect_loop_stops_at_the_limit_with_a_problem_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = calls.clone();
    let transport = LoopbackTransport::new(move |exchange: Exchange| {
        let calls = calls_in.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            exchange.response.set_status(StatusCode::FOUND);
            exchange
                .response
                .insert_header(header::LOCATION, HeaderValue::from_static("/redirect-loop"));
            Ok(())
        }
    });
    transport.set_allow_auto_redirect(true);
    transport.set_auto_redirect_limit(20);

    let response = transport
        .send(common::get("http://localhost/redirect-loop"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json; charset=utf-8"
    );
    // The initial exchange plus exactly the 20 permitted redirect hops.
    assert_eq!(calls.load(Ordering::SeqCst), 21);

    let body = common::read_body(response).await;
    let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
    assert_eq!(problem.title, "Too many redirects");
    assert_eq!(problem.status, 500);
    assert!(problem.detail.contains("20"), "detail names the limit: {}", problem.detail);
}

#[tokio::test]
async fn missing_location_is_terminal() {
    let transport = LoopbackTransport::new(|exchange: Exchange| async move {
        exchange.response.set_status(StatusCode::FOUND);
        Ok(())
    });
    transport.set_allow_auto_redirect(true);

    let response = transport
        .send(common::get("http://localhost/nowhere"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn chained_redirects_end_on_the_last_location() {
    // Four consecutive redirects ending in a 200.
    let transport = LoopbackTransport::new(|exchange: Exchange| async move {
        let path = exchange.request.path().to_string();
        let response = &exchange.response;
        match path.as_str() {
            "/hop1" => {
                response.set_status(StatusCode::MOVED_PERMANENTLY);
                response.insert_header(header::LOCATION, HeaderValue::from_static("/hop2"));
            }
            "/hop2" => {
                response.set_status(StatusCode::FOUND);
                response.insert_header(header::LOCATION, HeaderValue::from_static("hop3"));
            }
            "/hop3" => {
                response.set_status(StatusCode::SEE_OTHER);
                response.insert_header(
                    header::LOCATION,
                    HeaderValue::from_static("http://localhost/hop4"),
                );
            }
            "/hop4" => {
                response.set_status(StatusCode::TEMPORARY_REDIRECT);
                response.insert_header(header::LOCATION, HeaderValue::from_static("/done"));
            }
            "/done" => response.set_status(StatusCode::OK),
            _ => response.set_status(StatusCode::NOT_FOUND),
        }
        Ok(())
    });
    transport.set_allow_auto_redirect(true);

    let response = transport
        .send(common::get("http://localhost/hop1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::effective(&response).uri, "http://localhost/done");
}
