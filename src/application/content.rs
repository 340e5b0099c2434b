//! Content-transformation pipeline over raw post bodies.
//!
//! All rewrites are tag-scoped: each `<img>` is matched and rewritten on
//! its own through a streaming rewriter, never via a strict document
//! parse. Stored bodies predate this engine and include malformed
//! fragments; per-tag matching keeps those stable across round trips, so
//! the granularity here is a compatibility contract, not a shortcut.

use std::cell::RefCell;
use std::rc::Rc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FileStore, RepoError};

/// 1×1 transparent GIF substituted for `src` so browsers defer the real
/// fetch until a lazy-load script swaps `data-src` back in.
pub const LAZY_IMAGE_PLACEHOLDER: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAP///wAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw==";

const VIDEO_EMBED_OPEN: &str = "[youtube:";

const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "png", "webp"];

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content rewrite failed: {message}")]
    Rewrite { message: String },
    #[error(transparent)]
    Store(#[from] RepoError),
}

fn rewrite_error(err: impl std::fmt::Display) -> ContentError {
    ContentError::Rewrite {
        message: err.to_string(),
    }
}

/// Display-path composition: lazy-load images, then expand video embeds.
pub fn render_content(body: &str) -> Result<String, ContentError> {
    if body.is_empty() {
        return Ok(String::new());
    }
    let lazy = apply_lazy_loading(body)?;
    Ok(expand_video_embeds(&lazy))
}

/// Swap every `<img>` `src` for the transparent placeholder and carry the
/// original URL in `data-src`. Tags without `src`, and tags already
/// holding the placeholder, pass through untouched.
pub fn apply_lazy_loading(body: &str) -> Result<String, ContentError> {
    rewrite_str(
        body,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                let src = el.get_attribute("src").unwrap_or_default();
                if src == LAZY_IMAGE_PLACEHOLDER {
                    return Ok(());
                }
                el.set_attribute("src", LAZY_IMAGE_PLACEHOLDER)?;
                el.set_attribute("data-src", &src)?;
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)
}

/// Expand every `[youtube:ID]` occurrence into the fixed lazy iframe
/// snippet. The bracket syntax never spans lines; an unterminated or
/// multi-line occurrence is left as literal text.
pub fn expand_video_embeds(body: &str) -> String {
    let mut output = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find(VIDEO_EMBED_OPEN) {
        let after_marker = start + VIDEO_EMBED_OPEN.len();
        let id_end = rest[after_marker..].find(']').map(|i| after_marker + i);

        match id_end {
            Some(end) if !rest[after_marker..end].contains('\n') => {
                output.push_str(&rest[..start]);
                output.push_str(&video_embed_html(&rest[after_marker..end]));
                rest = &rest[end + 1..];
            }
            _ => {
                output.push_str(&rest[..after_marker]);
                rest = &rest[after_marker..];
            }
        }
    }

    output.push_str(rest);
    output
}

fn video_embed_html(id: &str) -> String {
    format!(
        "<div class=\"video\"><iframe width=\"560\" height=\"315\" title=\"YouTube embed\" \
         src=\"about:blank\" data-src=\"https://www.youtube-nocookie.com/embed/{id}\
         ?modestbranding=1&amp;hd=1&amp;rel=0&amp;theme=light\" allowfullscreen></iframe></div>"
    )
}

/// Move base64 image payloads out of the body and into the file store.
///
/// Only `<img>` tags carrying both a `data:<mime>;base64,<payload>` `src`
/// and a `data-filename` attribute participate. A tag with a disallowed
/// extension, an undecodable payload, or a malformed data URI is skipped
/// individually; the rest of the body is still processed. Re-running over
/// an already-externalized body is a no-op. Store failures abort the save.
pub async fn externalize_embedded_images(
    body: &str,
    files: &dyn FileStore,
) -> Result<String, ContentError> {
    let candidates = collect_embedded_images(body)?;
    if candidates.iter().all(Option::is_none) {
        return Ok(body.to_string());
    }

    // Persist every payload before any tag is rewritten; a failed write
    // must leave the body unchanged.
    let mut references = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match candidate {
            Some(image) => {
                let reference = files
                    .save_file(image.bytes, &image.file_name, None)
                    .await
                    .map_err(ContentError::Store)?;
                references.push(Some(reference));
            }
            None => references.push(None),
        }
    }

    let references = Rc::new(RefCell::new(references.into_iter()));
    rewrite_str(
        body,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src][data-filename]", {
                let references = Rc::clone(&references);
                move |el| {
                    if let Some(Some(reference)) = references.borrow_mut().next() {
                        el.set_attribute("src", &reference)?;
                        el.remove_attribute("data-filename");
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)
}

struct EmbeddedImage {
    file_name: String,
    bytes: Bytes,
}

/// First pass: visit qualifying tags in document order and decide, per
/// ordinal, whether the tag's payload will be externalized. The second
/// pass replays the same selector, so ordinals line up.
fn collect_embedded_images(body: &str) -> Result<Vec<Option<EmbeddedImage>>, ContentError> {
    let found: Rc<RefCell<Vec<Option<EmbeddedImage>>>> = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        body,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src][data-filename]", {
                let found = Rc::clone(&found);
                move |el| {
                    let src = el.get_attribute("src").unwrap_or_default();
                    let file_name = el.get_attribute("data-filename").unwrap_or_default();
                    found.borrow_mut().push(decode_embedded_image(&src, &file_name));
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    Ok(Rc::try_unwrap(found)
        .map(RefCell::into_inner)
        .unwrap_or_default())
}

fn decode_embedded_image(src: &str, file_name: &str) -> Option<EmbeddedImage> {
    if !has_allowed_extension(file_name) {
        debug!(file_name, "skipping embedded image with disallowed extension");
        return None;
    }

    let uri = src
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .map(|_| &src[5..])?;
    let (mime, payload) = uri.split_once(";base64,")?;
    if !mime.contains('/') {
        return None;
    }

    match STANDARD.decode(payload.trim()) {
        Ok(bytes) => Some(EmbeddedImage {
            file_name: file_name.to_string(),
            bytes: Bytes::from(bytes),
        }),
        Err(err) => {
            debug!(file_name, error = %err, "skipping embedded image with undecodable payload");
            None
        }
    }
}

fn has_allowed_extension(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
