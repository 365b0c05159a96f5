//! SPIR-V shader modules and program bookkeeping

use std::collections::HashMap;
use std::io::Cursor;

use ash::vk;

use super::{VulkanError, VulkanResult};
use crate::backend::ShaderStage;
use crate::pipeline::UniformValue;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const OP_NAME: u32 = 5;
const OP_MEMBER_NAME: u32 = 6;

/// Compiled shader module
pub struct VkShader {
    /// Module handle
    pub module: vk::ShaderModule,
    /// Stage the module was compiled for
    pub stage: ShaderStage,
    /// Debug names found in the module
    pub names: Vec<String>,
}

/// Linked program: two modules, a layout and CPU-side uniform storage
pub struct VkProgram {
    /// Friendly name
    pub name: String,
    /// Vertex module
    pub vertex: vk::ShaderModule,
    /// Fragment module
    pub fragment: vk::ShaderModule,
    /// Empty pipeline layout
    pub layout: vk::PipelineLayout,
    /// Uniform names; the location is the index
    pub uniforms: Vec<String>,
    /// Attribute bindings from link time
    pub attributes: Vec<(u32, String)>,
    /// Last value per location, pushed when draws are recorded
    pub values: HashMap<i32, UniformValue>,
}

/// Decode a little-endian SPIR-V byte stream into words
pub fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| VulkanError::InvalidOperation {
        reason: format!("malformed SPIR-V: {e}"),
    })?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(VulkanError::InvalidOperation {
            reason: "missing SPIR-V magic number".to_string(),
        });
    }
    Ok(words)
}

fn literal_string(words: &[u32]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Names from `OpName` and `OpMemberName`, in module order, without duplicates
///
/// Uniform block members carry the GLSL uniform names, so this stands in
/// for reflection when resolving uniform locations by name.
pub fn reflect_names(words: &[u32]) -> Vec<String> {
    let mut names = Vec::new();
    let mut index = 5;
    while index < words.len() {
        let word = words[index];
        let opcode = word & 0xFFFF;
        let count = (word >> 16) as usize;
        if count == 0 || index + count > words.len() {
            break;
        }
        let operands = &words[index + 1..index + count];
        let name = match opcode {
            OP_NAME if operands.len() > 1 => Some(literal_string(&operands[1..])),
            OP_MEMBER_NAME if operands.len() > 2 => Some(literal_string(&operands[2..])),
            _ => None,
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        index += count;
    }
    names
}

impl VkShader {
    /// Create a module from SPIR-V bytes
    pub fn create(device: &ash::Device, stage: ShaderStage, bytes: &[u8]) -> VulkanResult<Self> {
        let words = spirv_words(bytes)?;
        let names = reflect_names(&words);
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { module, stage, names })
    }

    /// Free the module
    pub fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_shader_module(self.module, None) };
    }
}

impl VkProgram {
    /// Build the layout and merge the stages' names
    pub fn link(
        device: &ash::Device,
        name: &str,
        vertex: &VkShader,
        fragment: &VkShader,
        attributes: &[(u32, &str)],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        let attribute_names: Vec<&str> = attributes.iter().map(|&(_, n)| n).collect();
        let mut uniforms: Vec<String> = Vec::new();
        for candidate in vertex.names.iter().chain(&fragment.names) {
            if candidate != "main" && !attribute_names.contains(&candidate.as_str()) && !uniforms.contains(candidate) {
                uniforms.push(candidate.clone());
            }
        }

        Ok(Self {
            name: name.to_string(),
            vertex: vertex.module,
            fragment: fragment.module,
            layout,
            uniforms,
            attributes: attributes.iter().map(|&(loc, n)| (loc, n.to_string())).collect(),
            values: HashMap::new(),
        })
    }

    /// Free the layout; modules are owned by their shaders
    pub fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_pipeline_layout(self.layout, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(opcode: u32, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | opcode];
        words.extend_from_slice(operands);
        words
    }

    fn string_words(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn module(names: &[(u32, &str)], members: &[(u32, u32, &str)]) -> Vec<u32> {
        let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 100, 0];
        for &(id, name) in names {
            let mut operands = vec![id];
            operands.extend(string_words(name));
            words.extend(instruction(OP_NAME, &operands));
        }
        for &(ty, member, name) in members {
            let mut operands = vec![ty, member];
            operands.extend(string_words(name));
            words.extend(instruction(OP_MEMBER_NAME, &operands));
        }
        words
    }

    #[test]
    fn test_reflect_names() {
        let words = module(
            &[(1, "main"), (2, "Globals")],
            &[(2, 0, "ModelViewProjectionMatrix"), (2, 1, "color")],
        );
        assert_eq!(
            reflect_names(&words),
            vec!["main", "Globals", "ModelViewProjectionMatrix", "color"]
        );
    }

    #[test]
    fn test_spirv_words_rejects_garbage() {
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[0, 0, 0, 0]).is_err());
        let bytes: Vec<u8> = module(&[], &[]).iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(spirv_words(&bytes).unwrap().len(), 5);
    }

    #[test]
    fn test_truncated_instruction_stops_scan() {
        let mut words = module(&[(1, "color")], &[]);
        words.push((9 << 16) | OP_NAME);
        assert_eq!(reflect_names(&words), vec!["color"]);
    }
}
