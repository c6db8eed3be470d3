//! Markup persisted as raw text plus its parsed tree.

use std::collections::HashSet;

use tp_fragment::{Document, SerializeError, dump_tree, load_tree};
use url::Url;

use crate::{Error, TextPress};

/// Raw source, the id of the parser that read it and the serialized tree.
///
/// The blob is what gets rendered, so content stays displayable even if
/// its parser is uninstalled later. Such content is no longer editable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMarkup {
    raw: String,
    parser: String,
    blob: Vec<u8>,
}

impl StoredMarkup {
    /// Parse `raw` and store the result. Without a parser id the configured
    /// default parser is used and its id recorded.
    pub fn new(
        app: &mut TextPress,
        raw: impl Into<String>,
        parser: Option<&str>,
        reason: &str,
    ) -> Result<Self, Error> {
        let raw = raw.into();
        let (parser, built) = app.resolve_parser(parser)?;
        let tree = app.parse_with(built.as_ref(), &raw, reason, app.config.markup.optimize)?;
        Ok(Self {
            blob: dump_tree(&tree)?,
            raw,
            parser,
        })
    }

    /// Rebuild from persisted columns.
    #[must_use]
    pub fn from_parts(raw: String, parser: String, blob: Vec<u8>) -> Self {
        Self { raw, parser, blob }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parser(&self) -> &str {
        &self.parser
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Load the stored tree.
    pub fn tree(&self) -> Result<Document, SerializeError> {
        load_tree(&self.blob)
    }

    pub fn render(&self, app: &TextPress) -> Result<String, Error> {
        app.render(&self.tree()?)
    }

    /// Whether the parser that produced this content is still registered.
    pub fn is_editable(&self, app: &TextPress) -> bool {
        app.parsers.contains(&self.parser)
    }

    /// Replace the raw text, re-parsing it with the stored parser.
    pub fn set_raw(
        &mut self,
        app: &mut TextPress,
        raw: impl Into<String>,
        reason: &str,
    ) -> Result<(), Error> {
        let parser = self.parser.clone();
        *self = Self::new(app, raw, Some(&parser), reason)?;
        Ok(())
    }

    /// Absolute URLs of all links, resolved against `base`, without
    /// duplicates. Requires the parser to still be registered.
    pub fn find_urls(&self, app: &mut TextPress, base: &Url) -> Result<Vec<Url>, Error> {
        let tree = app.parse(&self.raw, Some(&self.parser), "linksearch", false)?;
        let links = tree.query(tree.root(), "a[@href]")?;
        let mut seen = HashSet::new();
        let urls = links
            .iter()
            .filter_map(|link| base.join(link.attribute("href")?).ok())
            .filter(|url| seen.insert(url.clone()))
            .collect();
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tp_config::Config;
    use tp_parsers::ParseError;

    use super::*;

    fn app() -> TextPress {
        let mut config = Config::default();
        config.cache_resolved.enabled = false;
        TextPress::new(config)
    }

    #[test]
    fn test_new_records_parser_and_blob() {
        let mut app = app();
        let stored = StoredMarkup::new(&mut app, "**hi**", Some("comment"), "comment").unwrap();

        assert_eq!(stored.raw(), "**hi**");
        assert_eq!(stored.parser(), "comment");
        assert_eq!(stored.render(&app).unwrap(), "<p><strong>hi</strong></p>");

        let copy = StoredMarkup::from_parts(
            stored.raw().to_owned(),
            stored.parser().to_owned(),
            stored.blob().to_vec(),
        );
        assert_eq!(copy, stored);
    }

    #[test]
    fn test_missing_parser_keeps_content_readable() {
        let mut app = app();
        let mut stored = StoredMarkup::new(&mut app, "= Title", Some("creole"), "page").unwrap();
        assert!(stored.is_editable(&app));

        app.parsers.unregister("creole");
        assert!(!stored.is_editable(&app));
        assert_eq!(stored.render(&app).unwrap(), "<h1>Title</h1>");

        let err = stored.set_raw(&mut app, "= Other", "page").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::UnknownParser(_))));
        assert_eq!(stored.raw(), "= Title");
    }

    #[test]
    fn test_deeply_nested_markup_survives_storage() {
        let mut app = app();
        app.config.markup.optimize = false;
        let raw = format!("{}x{}", "<div>".repeat(20_000), "</div>".repeat(20_000));
        let stored = StoredMarkup::new(&mut app, raw, Some("default"), "page").unwrap();

        let html = stored.render(&app).unwrap();
        assert_eq!(html.matches("<div>").count(), 20_000);
        assert_eq!(html.matches("</div>").count(), 20_000);
        assert!(html.contains("<div></div>x</div></div>"));
        assert_eq!(stored.tree().unwrap().node_count(), 20_002);
    }

    #[test]
    fn test_set_raw_reparses() {
        let mut app = app();
        let mut stored = StoredMarkup::new(&mut app, "*a*", Some("comment"), "comment").unwrap();
        stored.set_raw(&mut app, "*b*", "comment").unwrap();

        assert_eq!(stored.parser(), "comment");
        assert_eq!(stored.render(&app).unwrap(), "<p><em>b</em></p>");
    }

    #[test]
    fn test_find_urls() {
        let mut app = app();
        let stored = StoredMarkup::new(
            &mut app,
            "<a href=\"/about\">a</a> <a href=\"http://example.com/\">b</a> \
             <a href=\"about\">c</a> <a name=\"x\">d</a>",
            None,
            "post-body",
        )
        .unwrap();

        let base = Url::parse("http://blog.example.org/2008/post").unwrap();
        let urls: Vec<String> = stored
            .find_urls(&mut app, &base)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://blog.example.org/about".to_owned(),
                "http://example.com/".to_owned(),
                "http://blog.example.org/2008/about".to_owned(),
            ]
        );
    }
}
