use super::*;

// Length word, 256 frequency words, then the packed payload. No magic and
// no checksum; truncation only surfaces when the decoder runs dry.
pub const CONTAINER_HEADER_BYTES: usize = 4 + 256 * 4;

pub(super) fn encode_container(
    original_len: u32,
    histogram: &[u32; 256],
    payload: &[u8],
) -> Result<Vec<u8>, CohuffGpuError> {
    let total = CONTAINER_HEADER_BYTES
        .checked_add(payload.len())
        .ok_or(CohuffGpuError::DataTooLarge)?;
    let mut out = Vec::with_capacity(total);
    write_u32(&mut out, original_len);
    for &count in histogram.iter() {
        write_u32(&mut out, count);
    }
    out.extend_from_slice(payload);
    Ok(out)
}

pub(super) fn parse_container(
    bytes: &[u8],
) -> Result<(u32, Box<[u32; 256]>, &[u8]), CohuffGpuError> {
    if bytes.len() < CONTAINER_HEADER_BYTES {
        return Err(CohuffGpuError::InvalidContainer(
            "container shorter than its header",
        ));
    }
    let original_len = read_u32(bytes, 0)?;
    let mut histogram = Box::new([0u32; 256]);
    for symbol in 0..256 {
        histogram[symbol] = read_u32(bytes, 4 + symbol * 4)?;
    }
    let payload = &bytes[CONTAINER_HEADER_BYTES..];
    if original_len > 0 && payload.is_empty() {
        return Err(CohuffGpuError::InvalidContainer(
            "missing compressed payload",
        ));
    }
    Ok((original_len, histogram, payload))
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, CohuffGpuError> {
    let end = offset
        .checked_add(4)
        .ok_or(CohuffGpuError::InvalidContainer("u32 offset overflow"))?;
    let slice = bytes
        .get(offset..end)
        .ok_or(CohuffGpuError::InvalidContainer("u32 out of range"))?;
    let array: [u8; 4] = slice
        .try_into()
        .map_err(|_| CohuffGpuError::InvalidContainer("u32 parse failed"))?;
    Ok(u32::from_le_bytes(array))
}
