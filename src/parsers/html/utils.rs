/// 以占位符保留的行内元素
pub const PRESERVE_TAGS: &[&str] = &["a", "em", "strong", "code", "span", "sup", "sub", "mark"];

/// 作为翻译段落单位的块级元素
pub const BLOCK_TAGS: &[&str] = &[
    "p",
    "li",
    "dt",
    "dd",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "caption",
    "figcaption",
    "td",
    "th",
    "pre",
    "div",
];

/// 不含可翻译内容的元素
pub const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "svg", "math"];

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

pub fn is_preserve_tag(tag: &str) -> bool {
    PRESERVE_TAGS.contains(&tag)
}

pub fn is_skip_tag(tag: &str) -> bool {
    SKIP_TAGS.contains(&tag)
}
