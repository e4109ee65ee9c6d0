use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use crate::entities::{NewPost, PopulatedPost};
use crate::http::{ApiContext, ApiError, ApiJson, QueryPairs, Result, SharedStore};
use crate::http::controllers::not_found;
use crate::query::{ListPostsQuery, PostFilter, TagFilter};

pub fn router() -> Router<ApiContext> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post).fallback(not_found))
}

#[derive(serde::Serialize, Debug)]
struct PostsPage {
    total: usize,
    page: u64,
    limit: u64,
    posts: Vec<PopulatedPost>,
}

#[derive(serde::Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct CreatePost {
    title: String,
    desc: String,
    image: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl CreatePost {
    fn validate(self) -> Result<NewPost> {
        for (field, value) in [("title", &self.title), ("desc", &self.desc), ("image", &self.image)] {
            if value.is_empty() {
                return Err(ApiError::bad_request(format!("\"{field}\" is not allowed to be empty")));
            }
        }
        if let Some(i) = self.tags.iter().position(|x| x.is_empty()) {
            return Err(ApiError::bad_request(format!("\"tags[{i}]\" is not allowed to be empty")));
        }
        Ok(NewPost {
            title: self.title,
            desc: self.desc,
            image: self.image,
            tags: self.tags,
        })
    }
}

async fn list_posts(
    State(store): State<SharedStore>,
    QueryPairs(pairs): QueryPairs,
) -> Result<Json<PostsPage>> {
    let query = ListPostsQuery::parse(pairs)?;
    let mut filter = PostFilter::new();
    if let Some(keyword) = &query.keyword {
        filter = filter.with_keyword(keyword)?;
    }

    let store = store.read().await;
    if let Some(tag_name) = &query.tag {
        let tag = match store.find_tag_by_name(tag_name) {
            Some(tag) => TagFilter::Only(tag.id),
            None => TagFilter::Nothing,
        };
        filter = filter.with_tag(tag);
    }

    let total = store.count_posts(&filter);
    let posts = store.find_posts(&filter, &query.sort, query.skip(), query.limit)
        .into_iter()
        .map(|x| store.populate(x))
        .collect();

    Ok(Json(PostsPage {
        total,
        page: query.page,
        limit: query.limit,
        posts,
    }))
}

async fn create_post(
    State(store): State<SharedStore>,
    ApiJson(req): ApiJson<CreatePost>,
) -> Result<(StatusCode, Json<PopulatedPost>)> {
    let new_post = req.validate()?;
    let mut store = store.write().await;
    let post = store.create_post(new_post).await?;
    info!("Created post {} with {} tags", post.id, post.tags.len());
    Ok((StatusCode::CREATED, Json(store.populate(post))))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use axum::http::header::RETRY_AFTER;
    use serde_json::{json, Value};
    use crate::http::rate_limit::{RATELIMIT_LIMIT, RATELIMIT_POLICY, RATELIMIT_REMAINING, RATELIMIT_RESET};
    use crate::http::test_support::{app, app_with_storage, send, test_config};
    use crate::storage::InMemoryStorage;
    use crate::store::tests::BrokenStorage;

    fn post_body(title: &str, desc: &str, tags: &[&str]) -> Value {
        json!({ "title": title, "desc": desc, "image": "aGVsbG8=", "tags": tags })
    }

    fn titles(body: &Value) -> Vec<String> {
        body["posts"].as_array().unwrap().iter()
            .map(|x| x["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn create_post_then_filter_by_tag() {
        let app = app().await;

        let created = send(&app, Method::POST, "/posts", Some(post_body("T", "D", &["x"]))).await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["title"], "T");
        assert_eq!(created.body["tags"].as_array().unwrap().len(), 1);
        assert_eq!(created.body["tags"][0]["name"], "x");
        assert!(created.body["createdAt"].is_string());
        assert!(created.body["updatedAt"].is_string());

        let listed = send(&app, Method::GET, "/posts?tag=x", None).await;
        assert_eq!(listed.status, StatusCode::OK);
        assert_eq!(listed.body["total"], 1);
        assert_eq!(listed.body["page"], 1);
        assert_eq!(listed.body["limit"], 10);
        assert_eq!(listed.body["posts"][0]["id"], created.body["id"]);
        assert_eq!(listed.body["posts"][0]["tags"][0]["name"], "x");
    }

    #[tokio::test]
    async fn repeated_tag_names_share_one_tag() {
        let app = app().await;
        let created = send(&app, Method::POST, "/posts", Some(post_body("T", "D", &["a", "a", "b"]))).await;
        assert_eq!(created.status, StatusCode::CREATED);

        let tags = created.body["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0]["id"], tags[1]["id"]);
        assert_ne!(tags[0]["id"], tags[2]["id"]);

        let all_tags = send(&app, Method::GET, "/tags", None).await;
        assert_eq!(all_tags.body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tags_are_optional() {
        let app = app().await;
        let body = json!({ "title": "T", "desc": "D", "image": "aGk=" });
        let created = send(&app, Method::POST, "/posts", Some(body)).await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["tags"], json!([]));
    }

    #[tokio::test]
    async fn create_post_rejects_invalid_bodies() {
        let app = app().await;
        let bodies = [
            json!({ "desc": "D", "image": "aGk=" }),
            json!({ "title": "", "desc": "D", "image": "aGk=" }),
            json!({ "title": 5, "desc": "D", "image": "aGk=" }),
            json!({ "title": "T", "desc": "D", "image": "aGk=", "tags": null }),
            json!({ "title": "T", "desc": "D", "image": "aGk=", "tags": ["ok", ""] }),
            json!({ "title": "T", "desc": "D", "image": "aGk=", "author": "me" }),
        ];
        for body in bodies {
            let response = send(&app, Method::POST, "/posts", Some(body.clone())).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(response.body["error"], "BAD_REQUEST");
        }

        let listed = send(&app, Method::GET, "/posts", None).await;
        assert_eq!(listed.body["total"], 0);
    }

    #[tokio::test]
    async fn empty_title_names_the_field() {
        let app = app().await;
        let body = json!({ "title": "", "desc": "D", "image": "aGk=" });
        let response = send(&app, Method::POST, "/posts", Some(body)).await;
        assert_eq!(response.body["message"], "\"title\" is not allowed to be empty");
    }

    #[tokio::test]
    async fn list_posts_paginates_and_reports_total() {
        let app = app().await;
        for i in 0..5 {
            send(&app, Method::POST, "/posts", Some(post_body(&format!("post {i}"), "D", &[]))).await;
        }

        let first = send(&app, Method::GET, "/posts?limit=2&sort=title", None).await;
        assert_eq!(first.body["total"], 5);
        assert_eq!(titles(&first.body), vec!["post 0", "post 1"]);

        let last = send(&app, Method::GET, "/posts?limit=2&page=3&sort=title", None).await;
        assert_eq!(last.body["total"], 5);
        assert_eq!(last.body["page"], 3);
        assert_eq!(titles(&last.body), vec!["post 4"]);

        let beyond = send(&app, Method::GET, "/posts?limit=2&page=4", None).await;
        assert_eq!(beyond.body["total"], 5);
        assert!(titles(&beyond.body).is_empty());
    }

    #[tokio::test]
    async fn list_posts_defaults_to_newest_first() {
        let app = app().await;
        for title in ["first", "second", "third"] {
            send(&app, Method::POST, "/posts", Some(post_body(title, "D", &[]))).await;
        }
        let listed = send(&app, Method::GET, "/posts", None).await;
        assert_eq!(titles(&listed.body), vec!["third", "second", "first"]);

        let ascending = send(&app, Method::GET, "/posts?sort=createdAt", None).await;
        assert_eq!(titles(&ascending.body), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn sort_by_unknown_field_keeps_insertion_order() {
        let app = app().await;
        for title in ["first", "second", "third"] {
            send(&app, Method::POST, "/posts", Some(post_body(title, "D", &[]))).await;
        }
        let listed = send(&app, Method::GET, "/posts?sort=author", None).await;
        assert_eq!(listed.status, StatusCode::OK);
        assert_eq!(listed.body["total"], 3);
        assert_eq!(titles(&listed.body), vec!["first", "second", "third"]);

        let by_tags = send(&app, Method::GET, "/posts?sort=-tags", None).await;
        assert_eq!(by_tags.status, StatusCode::OK);
        assert_eq!(titles(&by_tags.body), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn keyword_matches_title_or_desc_case_insensitively() {
        let app = app().await;
        send(&app, Method::POST, "/posts", Some(post_body("Hello World", "intro", &[]))).await;
        send(&app, Method::POST, "/posts", Some(post_body("Other", "well, HELLO there", &[]))).await;
        send(&app, Method::POST, "/posts", Some(post_body("Unrelated", "nothing", &[]))).await;

        let listed = send(&app, Method::GET, "/posts?keyword=hello", None).await;
        assert_eq!(listed.body["total"], 2);

        let invalid = send(&app, Method::GET, "/posts?keyword=(", None).await;
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_tag_filter_matches_nothing() {
        let app = app().await;
        send(&app, Method::POST, "/posts", Some(post_body("T", "D", &["x"]))).await;
        let listed = send(&app, Method::GET, "/posts?tag=nope", None).await;
        assert_eq!(listed.status, StatusCode::OK);
        assert_eq!(listed.body["total"], 0);
        assert_eq!(listed.body["posts"], json!([]));
    }

    #[tokio::test]
    async fn list_posts_rejects_invalid_queries() {
        let app = app().await;
        for uri in [
            "/posts?page=0",
            "/posts?limit=-1",
            "/posts?limit=1.5",
            "/posts?page=abc",
            "/posts?page=1&page=2",
            "/posts?keyword=",
        ] {
            let response = send(&app, Method::GET, uri, None).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "uri: {uri}");
            assert_eq!(response.body["error"], "BAD_REQUEST");
        }

        let unknown = send(&app, Method::GET, "/posts?author=me", None).await;
        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
        assert_eq!(unknown.body["message"], "\"author\" is not allowed");
    }

    #[tokio::test]
    async fn store_failures_are_server_errors() {
        let (app, _) = app_with_storage(test_config(), Box::new(BrokenStorage)).await;
        let response = send(&app, Method::POST, "/posts", Some(post_body("T", "D", &[]))).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["error"], "SERVER_ERROR");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut config = test_config();
        config.api.body_limit = 64;
        let (app, _) = app_with_storage(config, Box::new(InMemoryStorage::default())).await;
        let image = "a".repeat(1024);
        let body = json!({ "title": "T", "desc": "D", "image": image });
        let response = send(&app, Method::POST, "/posts", Some(body)).await;
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.body["error"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn requests_over_the_rate_limit_get_429() {
        let mut config = test_config();
        config.rate_limit.max_requests = 2;
        let (app, _) = app_with_storage(config, Box::new(InMemoryStorage::default())).await;

        let first = send(&app, Method::GET, "/posts", None).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.headers[RATELIMIT_POLICY], "2;w=900");
        assert_eq!(first.headers[RATELIMIT_LIMIT], "2");
        assert_eq!(first.headers[RATELIMIT_REMAINING], "1");

        let second = send(&app, Method::GET, "/tags", None).await;
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.headers[RATELIMIT_REMAINING], "0");

        let third = send(&app, Method::GET, "/posts", None).await;
        assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.body["error"], "TOO_MANY_REQUESTS");
        assert!(third.headers.contains_key(RETRY_AFTER));
        assert!(third.headers.contains_key(RATELIMIT_RESET));
    }
}
