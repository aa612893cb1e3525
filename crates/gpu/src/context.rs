use crate::pipeline::ShaderSource;
use crate::textures::DecodedImage;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeLocation(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    Triangles,
}

/// How one vertex attribute reads from the bound buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttributeBinding {
    /// Component count (1..=4 floats).
    pub size: u32,
    pub stride_bytes: u32,
    pub offset_bytes: u32,
    /// 0 for per-vertex data, 1 for per-instance data.
    pub divisor: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Mat4([f32; 16]),
    Vec2([f32; 2]),
    Float(f32),
    Int(i32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub first: u32,
    /// Vertices per draw (per instance when instanced).
    pub count: u32,
    pub instances: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    ContextLost,
    ShaderCompile(String),
    ProgramLink(String),
    ResourceCreation(String),
    MissingAttribute(String),
    MissingUniform(String),
    DrawFailed(String),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::ContextLost => write!(f, "GPU context lost"),
            GpuError::ShaderCompile(log) => write!(f, "shader compile failed: {log}"),
            GpuError::ProgramLink(log) => write!(f, "program link failed: {log}"),
            GpuError::ResourceCreation(what) => write!(f, "failed to create {what}"),
            GpuError::MissingAttribute(name) => write!(f, "attribute not found: {name}"),
            GpuError::MissingUniform(name) => write!(f, "uniform not found: {name}"),
            GpuError::DrawFailed(reason) => write!(f, "draw call failed: {reason}"),
        }
    }
}

impl std::error::Error for GpuError {}

/// The GPU capability the overlay draws through.
///
/// Implemented by the host over WebGL/wgpu; `RecordingBackend` implements it
/// for headless runs.
pub trait GpuBackend {
    fn is_context_lost(&self) -> bool;

    fn create_buffer(&mut self) -> Result<BufferHandle, GpuError>;
    fn upload_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), GpuError>;
    fn bind_buffer(&mut self, buffer: BufferHandle) -> Result<(), GpuError>;

    /// Compiles and links both stages.
    fn create_program(&mut self, source: &ShaderSource) -> Result<ProgramHandle, GpuError>;
    fn use_program(&mut self, program: ProgramHandle) -> Result<(), GpuError>;
    fn attribute_location(&mut self, program: ProgramHandle, name: &str)
    -> Option<AttributeLocation>;
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn vertex_attribute(
        &mut self,
        location: AttributeLocation,
        binding: AttributeBinding,
    ) -> Result<(), GpuError>;
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue)
    -> Result<(), GpuError>;

    fn create_texture(&mut self, image: &DecodedImage) -> Result<TextureHandle, GpuError>;
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> Result<(), GpuError>;

    fn viewport(&mut self, width: u32, height: u32) -> Result<(), GpuError>;
    fn clear(&mut self) -> Result<(), GpuError>;
    fn draw(&mut self, call: DrawCall) -> Result<(), GpuError>;
}
