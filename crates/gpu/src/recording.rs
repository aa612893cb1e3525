use std::collections::{BTreeMap, BTreeSet};

use crate::context::{
    AttributeBinding, AttributeLocation, BufferHandle, DrawCall, GpuBackend, GpuError,
    ProgramHandle, TextureHandle, UniformLocation, UniformValue,
};
use crate::pipeline::ShaderSource;
use crate::textures::DecodedImage;

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateBuffer(BufferHandle),
    UploadBuffer { buffer: BufferHandle, bytes: usize },
    BindBuffer(BufferHandle),
    CreateProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    VertexAttribute { location: AttributeLocation, binding: AttributeBinding },
    SetUniform { location: UniformLocation, value: UniformValue },
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    BindTexture { unit: u32, texture: TextureHandle },
    Viewport { width: u32, height: u32 },
    Clear,
    Draw(DrawCall),
}

/// Headless `GpuBackend` that records every call in order.
///
/// Faults can be injected to exercise error paths: context loss, failing
/// shader compilation, missing attributes and failing draws.
#[derive(Debug, Default, Clone)]
pub struct RecordingBackend {
    commands: Vec<GpuCommand>,
    next_handle: u32,
    locations: BTreeMap<(ProgramHandle, String), u32>,
    context_lost: bool,
    fail_compile: bool,
    fail_draws: bool,
    missing_names: BTreeSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    pub fn lose_context(&mut self) {
        self.context_lost = true;
    }

    pub fn restore_context(&mut self) {
        self.context_lost = false;
    }

    pub fn fail_compile(&mut self, fail: bool) {
        self.fail_compile = fail;
    }

    pub fn fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    /// Makes attribute/uniform lookups for `name` fail.
    pub fn hide_location(&mut self, name: impl Into<String>) {
        self.missing_names.insert(name.into());
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn live(&self) -> Result<(), GpuError> {
        if self.context_lost {
            Err(GpuError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        if self.context_lost || self.missing_names.contains(name) {
            return None;
        }
        let key = (program, name.to_string());
        if let Some(loc) = self.locations.get(&key) {
            return Some(*loc);
        }
        let loc = self.locations.len() as u32;
        self.locations.insert(key, loc);
        Some(loc)
    }
}

impl GpuBackend for RecordingBackend {
    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, GpuError> {
        self.live()?;
        let handle = BufferHandle(self.next());
        self.commands.push(GpuCommand::CreateBuffer(handle));
        Ok(handle)
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::UploadBuffer {
            buffer,
            bytes: bytes.len(),
        });
        Ok(())
    }

    fn bind_buffer(&mut self, buffer: BufferHandle) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::BindBuffer(buffer));
        Ok(())
    }

    fn create_program(&mut self, source: &ShaderSource) -> Result<ProgramHandle, GpuError> {
        self.live()?;
        if self.fail_compile {
            return Err(GpuError::ShaderCompile(format!(
                "injected failure ({} bytes of vertex source)",
                source.vertex.len()
            )));
        }
        let handle = ProgramHandle(self.next());
        self.commands.push(GpuCommand::CreateProgram(handle));
        Ok(handle)
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::UseProgram(program));
        Ok(())
    }

    fn attribute_location(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Option<AttributeLocation> {
        self.location(program, name).map(AttributeLocation)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.location(program, name).map(UniformLocation)
    }

    fn vertex_attribute(
        &mut self,
        location: AttributeLocation,
        binding: AttributeBinding,
    ) -> Result<(), GpuError> {
        self.live()?;
        self.commands
            .push(GpuCommand::VertexAttribute { location, binding });
        Ok(())
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::SetUniform { location, value });
        Ok(())
    }

    fn create_texture(&mut self, image: &DecodedImage) -> Result<TextureHandle, GpuError> {
        self.live()?;
        let texture = TextureHandle(self.next());
        self.commands.push(GpuCommand::CreateTexture {
            texture,
            width: image.width,
            height: image.height,
        });
        Ok(texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn viewport(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::Viewport { width, height });
        Ok(())
    }

    fn clear(&mut self) -> Result<(), GpuError> {
        self.live()?;
        self.commands.push(GpuCommand::Clear);
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), GpuError> {
        self.live()?;
        if self.fail_draws {
            return Err(GpuError::DrawFailed("injected failure".to_string()));
        }
        self.commands.push(GpuCommand::Draw(call));
        Ok(())
    }
}
