use tracing::debug;

use crate::context::{GpuBackend, GpuError, TextureHandle};

/// RGBA8 pixels produced by the host's image decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        (rgba.len() == expected).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Single-colour image, handy as a placeholder sprite.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        Self {
            width,
            height,
            rgba: rgba.repeat(pixels),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureRole {
    IconSprite,
    FontAtlas,
}

impl TextureRole {
    /// Texture unit the role is bound to.
    pub fn unit(self) -> u32 {
        match self {
            TextureRole::IconSprite => 0,
            TextureRole::FontAtlas => 1,
        }
    }

    pub fn sampler_uniform(self) -> &'static str {
        match self {
            TextureRole::IconSprite => "iconTexture",
            TextureRole::FontAtlas => "fontTexture",
        }
    }
}

/// GPU copy of an image; uploaded once per image revision, bound every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub handle: TextureHandle,
    pub revision: u64,
}

impl TextureSlot {
    /// Uploads `image` if `slot` is empty or holds an older revision, then
    /// binds it to the role's unit. Returns `true` on upload.
    pub fn sync(
        slot: &mut Option<TextureSlot>,
        backend: &mut dyn GpuBackend,
        role: TextureRole,
        image: &DecodedImage,
        revision: u64,
    ) -> Result<bool, GpuError> {
        let mut uploaded = false;
        let handle = match slot {
            Some(existing) if existing.revision == revision => existing.handle,
            _ => {
                debug!(?role, width = image.width, height = image.height, "uploading texture");
                let handle = backend.create_texture(image)?;
                *slot = Some(TextureSlot { handle, revision });
                uploaded = true;
                handle
            }
        };
        backend.bind_texture(role.unit(), handle)?;
        Ok(uploaded)
    }
}
