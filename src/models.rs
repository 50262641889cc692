mod post;

pub use post::{NewPost, Post, PostId, PostPatch};
