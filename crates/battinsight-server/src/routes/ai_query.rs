use crate::client;
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use battinsight_core::errors::PipelineError;
use battinsight_core::model::{QueryOptions, QueryRequest};
use battinsight_core::QueryPipeline;
use serde_json::Value;

/// `POST {prefix}/ai-query`
pub async fn handle(
    req: HttpRequest,
    body: web::Bytes,
    pipeline: web::Data<QueryPipeline>,
) -> HttpResponse {
    let rid = client::request_id(&req);

    let (query, options) = match parse_body(&req, &body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::info!(event = "ai_query_bad_request", rid = %rid, error = %e);
            return error_response(&e);
        }
    };

    let request = QueryRequest {
        query,
        options,
        client: client::client_info(&req),
        request_id: rid,
    };

    match pipeline.run(&request).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => error_response(&e),
    }
}

fn parse_body(req: &HttpRequest, body: &[u8]) -> Result<(String, QueryOptions), PipelineError> {
    let not_json = || PipelineError::BadRequest("Request must be JSON".into());

    let mime = req.content_type();
    if mime != "application/json" && !mime.ends_with("+json") {
        return Err(not_json());
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| not_json())?;
    let Value::Object(mut obj) = value else {
        return Err(not_json());
    };

    let query = match obj.remove("query") {
        Some(Value::String(q)) if !q.trim().is_empty() => q,
        _ => return Err(PipelineError::BadRequest("Missing query parameter".into())),
    };

    let options = match obj.remove("options") {
        None | Some(Value::Null) => QueryOptions::default(),
        Some(raw) => serde_json::from_value(raw)
            .map_err(|e| PipelineError::BadRequest(format!("Invalid options: {e}")))?,
    };

    Ok((query, options))
}

fn error_response(err: &PipelineError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(serde_json::json!({ "error": err.public_message() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn json_req() -> HttpRequest {
        TestRequest::post()
            .insert_header(("Content-Type", "application/json"))
            .to_http_request()
    }

    fn message(r: Result<(String, QueryOptions), PipelineError>) -> String {
        r.unwrap_err().public_message()
    }

    #[test]
    fn test_form_body_is_not_json() {
        let req = TestRequest::post()
            .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
            .to_http_request();
        assert_eq!(message(parse_body(&req, b"query=x")), "Request must be JSON");
    }

    #[test]
    fn test_malformed_json() {
        assert_eq!(message(parse_body(&json_req(), b"{\"query\":")), "Request must be JSON");
        assert_eq!(message(parse_body(&json_req(), b"[1,2]")), "Request must be JSON");
    }

    #[test]
    fn test_missing_or_blank_query() {
        assert_eq!(message(parse_body(&json_req(), b"{}")), "Missing query parameter");
        assert_eq!(
            message(parse_body(&json_req(), br#"{"query": "  "}"#)),
            "Missing query parameter"
        );
        assert_eq!(
            message(parse_body(&json_req(), br#"{"query": 42}"#)),
            "Missing query parameter"
        );
    }

    #[test]
    fn test_options_are_parsed() {
        let (q, opts) = parse_body(
            &json_req(),
            br#"{"query": "avg val", "options": {"max_results": 5, "include_metadata": false}}"#,
        )
        .unwrap();
        assert_eq!(q, "avg val");
        assert_eq!(opts.max_results, Some(5));
        assert!(!opts.include_metadata);
    }

    #[test]
    fn test_bad_options_are_rejected() {
        let msg = message(parse_body(
            &json_req(),
            br#"{"query": "avg val", "options": {"max_results": "lots"}}"#,
        ));
        assert!(msg.starts_with("Invalid options"), "{msg}");
    }
}
