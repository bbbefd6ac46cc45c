use axum::response::Html;

const INDEX: &str = include_str!("../assets/index.html");
const ABOUT: &str = include_str!("../assets/about.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX)
}

pub async fn about() -> Html<&'static str> {
    Html(ABOUT)
}
