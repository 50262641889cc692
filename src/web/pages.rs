use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
};
use pulldown_cmark::{html, Options, Parser};
use std::sync::Arc;

use crate::{
    models::{Post, PostId},
    Error, Result,
};

use super::AppState;

const EXCERPT_CHARS: usize = 160;

/// Display-ready fields shared by the listing and detail pages.
struct PostView {
    id: String,
    title: String,
    excerpt: String,
    published: String,
    author_name: Option<String>,
    image_url: Option<String>,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.to_string(),
            title: post.title.clone(),
            excerpt: post.preview(EXCERPT_CHARS),
            published: post.created_at.format("%B %-d, %Y").to_string(),
            author_name: post.author_name.clone().filter(|name| !name.is_empty()),
            image_url: post.image_url.clone().filter(|url| !url.is_empty()),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    posts: Vec<PostView>,
}

#[derive(Template)]
#[template(path = "post.html")]
struct PostTemplate {
    post: PostView,
    body_html: String,
}

/// Renders post markdown. Embedded HTML such as `<video>` tags is passed through.
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::all());
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Response> {
    let posts = state.repo.list().await;

    let template = IndexTemplate {
        posts: posts.iter().map(PostView::from).collect(),
    };
    render(template)
}

pub async fn show_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let post = state
        .repo
        .get(&PostId::from(id))
        .await
        .ok_or(Error::NotFound)?;

    let template = PostTemplate {
        body_html: render_markdown(&post.content),
        post: PostView::from(&post),
    };
    render(template)
}

fn render(template: impl Template) -> Result<Response> {
    Ok(Html(
        template
            .render()
            .map_err(|e| Error::Internal(format!("Template error: {}", e)))?,
    )
    .into_response())
}
