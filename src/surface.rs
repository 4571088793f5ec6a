// Surface negotiation
//
// Picks the colour format/colourspace pair the back buffers will use. The
// caller's preference is honoured when the surface allows it, otherwise the
// first reported pair is taken as-is.

use crate::error::BootstrapError;
use ash::vk;

/// A window surface bound to the context, with its format fixed at negotiation.
#[derive(Debug, Clone, Copy)]
pub struct NegotiatedSurface<S> {
    pub handle: S,
    pub format: vk::SurfaceFormatKHR,
}

/// Choose a surface format for `requested` from what the surface supports.
///
/// - A single `UNDEFINED` entry means the surface imposes no constraint:
///   the requested format is paired with that entry's colourspace.
/// - An exact format match is taken as reported.
/// - Otherwise the first reported entry wins.
pub fn negotiate_format(
    supported: &[vk::SurfaceFormatKHR],
    requested: vk::Format,
) -> Result<vk::SurfaceFormatKHR, BootstrapError> {
    let first = supported.first().ok_or(BootstrapError::NoSurfaceFormats)?;

    if supported.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(vk::SurfaceFormatKHR {
            format: requested,
            color_space: first.color_space,
        });
    }

    Ok(supported
        .iter()
        .find(|f| f.format == requested)
        .copied()
        .unwrap_or(*first))
}
