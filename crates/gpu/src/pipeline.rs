use std::collections::BTreeMap;

use crate::context::{
    AttributeBinding, AttributeLocation, GpuBackend, GpuError, ProgramHandle, UniformLocation,
    UniformValue,
};

/// Vertex and fragment shader text supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    /// Float components.
    pub size: usize,
}

impl VertexAttribute {
    pub const fn new(name: &'static str, size: usize) -> Self {
        Self { name, size }
    }
}

/// Field order of one interleaved vertex record.
///
/// The stride is the sum of attribute sizes and is fixed for the lifetime of
/// the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: usize,
}

impl VertexLayout {
    pub fn new(attributes: Vec<VertexAttribute>) -> Self {
        let stride = attributes.iter().map(|a| a.size).sum();
        Self { attributes, stride }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Float offset of `name` within a record.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for attr in &self.attributes {
            if attr.name == name {
                return Some(offset);
            }
            offset += attr.size;
        }
        None
    }

    /// `(attribute, binding)` pairs for this layout.
    pub fn bindings(&self, divisor: u32) -> Vec<(VertexAttribute, AttributeBinding)> {
        let float_size = std::mem::size_of::<f32>() as u32;
        let stride_bytes = self.stride as u32 * float_size;
        let mut offset = 0u32;
        let mut out = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            out.push((
                *attr,
                AttributeBinding {
                    size: attr.size as u32,
                    stride_bytes,
                    offset_bytes: offset * float_size,
                    divisor,
                },
            ));
            offset += attr.size as u32;
        }
        out
    }
}

/// A linked program with resolved attribute and uniform locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub program: ProgramHandle,
    attributes: Vec<(AttributeLocation, AttributeBinding)>,
    uniforms: BTreeMap<&'static str, UniformLocation>,
}

impl Pipeline {
    /// Compiles `source` and resolves every attribute of `layout` and every
    /// name in `uniforms`. Any missing location is an error.
    pub fn link(
        backend: &mut dyn GpuBackend,
        source: &ShaderSource,
        layout: &VertexLayout,
        instanced: bool,
        uniforms: &[&'static str],
    ) -> Result<Self, GpuError> {
        let program = backend.create_program(source)?;
        let divisor = u32::from(instanced);

        let mut attributes = Vec::with_capacity(layout.attributes().len());
        for (attr, binding) in layout.bindings(divisor) {
            let location = backend
                .attribute_location(program, attr.name)
                .ok_or_else(|| GpuError::MissingAttribute(attr.name.to_string()))?;
            attributes.push((location, binding));
        }

        let mut resolved = BTreeMap::new();
        for name in uniforms {
            let location = backend
                .uniform_location(program, name)
                .ok_or_else(|| GpuError::MissingUniform((*name).to_string()))?;
            resolved.insert(*name, location);
        }

        Ok(Self {
            program,
            attributes,
            uniforms: resolved,
        })
    }

    /// Activates the program and points every attribute at the bound buffer.
    pub fn bind(&self, backend: &mut dyn GpuBackend) -> Result<(), GpuError> {
        backend.use_program(self.program)?;
        for (location, binding) in &self.attributes {
            backend.vertex_attribute(*location, *binding)?;
        }
        Ok(())
    }

    pub fn set_uniform(
        &self,
        backend: &mut dyn GpuBackend,
        name: &str,
        value: UniformValue,
    ) -> Result<(), GpuError> {
        let location = self
            .uniforms
            .get(name)
            .ok_or_else(|| GpuError::MissingUniform(name.to_string()))?;
        backend.set_uniform(*location, value)
    }
}

#[cfg(test)]
mod tests {
    use super::{VertexAttribute, VertexLayout};

    #[test]
    fn layout_offsets_and_bindings() {
        let layout = VertexLayout::new(vec![
            VertexAttribute::new("vertex", 2),
            VertexAttribute::new("color", 4),
            VertexAttribute::new("pointSize", 1),
        ]);
        assert_eq!(layout.stride(), 7);
        assert_eq!(layout.offset_of("color"), Some(2));
        assert_eq!(layout.offset_of("pointSize"), Some(6));
        assert_eq!(layout.offset_of("missing"), None);

        let bindings = layout.bindings(1);
        assert_eq!(bindings[2].1.offset_bytes, 24);
        assert_eq!(bindings[2].1.stride_bytes, 28);
        assert!(bindings.iter().all(|(_, b)| b.divisor == 1));
    }
}
