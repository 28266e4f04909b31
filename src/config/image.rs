//! Configuration image loading and redirection.

use crate::error::{ChassisError, Result};
use crate::secure::CharmContext;
use crate::vres::VrMap;
use crate::xml::Document;

/// In-memory image of the decrypted configuration text.
///
/// The buffer is exclusively owned and zeroed before its storage is released,
/// so a charmed configuration never lingers in freed memory.
pub struct ConfigImage {
    bytes: Vec<u8>,
}

impl ConfigImage {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for ConfigImage {
    fn drop(&mut self) {
        self.bytes.fill(0);
    }
}

/// Loads configuration images through the resource mapper, decrypting charmed
/// resources with the single charm context fixed at bootstrap.
pub struct ImageLoader<'a> {
    rmap: &'a VrMap,
    charm: &'a CharmContext,
}

impl<'a> ImageLoader<'a> {
    pub fn new(rmap: &'a VrMap, charm: &'a CharmContext) -> Self {
        Self { rmap, charm }
    }

    /// Load the application's configuration image from the well-known virtual
    /// path `Config/<AppName>.xml`. `Ok(None)` means no configuration exists —
    /// an expected condition the caller recovers from with defaults.
    pub fn load(&self, app_name: &str) -> Result<Option<ConfigImage>> {
        self.load_path(&format!("Config/{app_name}.xml"))
    }

    /// Load an image from an explicit virtual path.
    pub fn load_path(&self, virtual_path: &str) -> Result<Option<ConfigImage>> {
        let loaded = self.rmap.load_charmed(virtual_path, self.charm)?;
        Ok(loaded.map(ConfigImage::new))
    }
}

/// Resolve a single redirection hop.
///
/// The root `<config>` element may carry a `redirect` attribute naming an
/// alternate configuration resource. Without one, the image is returned
/// unchanged. With one, the target is loaded with the same charm context and
/// the original buffer is released (and zeroed) exactly once. A redirect on
/// the target itself is rejected rather than silently ignored.
pub fn resolve_redirect(
    loader: &ImageLoader<'_>,
    image: ConfigImage,
) -> Result<Option<ConfigImage>> {
    let Ok(doc) = Document::parse(&image.as_text()) else {
        // Malformed images pass through; the extractor reports them invalid.
        return Ok(Some(image));
    };
    let root = doc.scope("config");
    let Some(target) = root.attr("redirect") else {
        return Ok(Some(image));
    };
    let target = target.to_string();
    tracing::debug!(target = %target, "configuration redirected");
    drop(image);

    let Some(redirected) = loader.load_path(&target)? else {
        return Ok(None);
    };
    if let Ok(redirected_doc) = Document::parse(&redirected.as_text()) {
        if redirected_doc.scope("config").has_attr("redirect") {
            return Err(ChassisError::RedirectChain { target });
        }
    }
    Ok(Some(redirected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringPool;

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, VrMap) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Config")).unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join("Config").join(name), content).unwrap();
        }
        let map = VrMap::rooted(StringPool::new(), dir.path());
        (dir, map)
    }

    #[test]
    fn image_without_redirect_is_returned_unchanged() {
        let (_dir, map) = fixture(&[("App.xml", "<config><logging verbose=\"true\"/></config>")]);
        let charm = CharmContext::cleartext();
        let loader = ImageLoader::new(&map, &charm);
        let image = loader.load("App").unwrap().unwrap();
        let original = image.as_bytes().to_vec();
        let resolved = resolve_redirect(&loader, image).unwrap().unwrap();
        assert_eq!(resolved.as_bytes(), original.as_slice());
    }

    #[test]
    fn redirect_substitutes_the_target_image() {
        let (_dir, map) = fixture(&[
            ("App.xml", "<config redirect=\"Config/Alt.xml\"/>"),
            ("Alt.xml", "<config><logging echo=\"true\"/></config>"),
        ]);
        let charm = CharmContext::cleartext();
        let loader = ImageLoader::new(&map, &charm);
        let image = loader.load("App").unwrap().unwrap();
        let resolved = resolve_redirect(&loader, image).unwrap().unwrap();
        assert_eq!(
            resolved.as_text(),
            "<config><logging echo=\"true\"/></config>"
        );
    }

    #[test]
    fn missing_redirect_target_resolves_to_none() {
        let (_dir, map) = fixture(&[("App.xml", "<config redirect=\"Config/Gone.xml\"/>")]);
        let charm = CharmContext::cleartext();
        let loader = ImageLoader::new(&map, &charm);
        let image = loader.load("App").unwrap().unwrap();
        assert!(resolve_redirect(&loader, image).unwrap().is_none());
    }

    #[test]
    fn chained_redirects_are_rejected() {
        let (_dir, map) = fixture(&[
            ("App.xml", "<config redirect=\"Config/Hop.xml\"/>"),
            ("Hop.xml", "<config redirect=\"Config/Further.xml\"/>"),
        ]);
        let charm = CharmContext::cleartext();
        let loader = ImageLoader::new(&map, &charm);
        let image = loader.load("App").unwrap().unwrap();
        assert!(matches!(
            resolve_redirect(&loader, image),
            Err(ChassisError::RedirectChain { .. })
        ));
    }

    #[test]
    fn charmed_configuration_decrypts_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Config")).unwrap();
        let pool = crate::secure::SecretPool::new();
        let charm = CharmContext::with_default_key(&pool);
        let charmed = charm.encode(b"<config><logging verbose=\"true\"/></config>").unwrap();
        std::fs::write(dir.path().join("Config/App.xml"), charmed).unwrap();

        let map = VrMap::rooted(StringPool::new(), dir.path());
        let loader = ImageLoader::new(&map, &charm);
        let image = loader.load("App").unwrap().unwrap();
        assert_eq!(
            image.as_text(),
            "<config><logging verbose=\"true\"/></config>"
        );
    }

    #[test]
    fn missing_configuration_is_not_found_not_an_error() {
        let (_dir, map) = fixture(&[]);
        let charm = CharmContext::cleartext();
        let loader = ImageLoader::new(&map, &charm);
        assert!(loader.load("Absent").unwrap().is_none());
    }
}
