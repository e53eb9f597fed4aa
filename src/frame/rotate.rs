use crate::size::Size;

/// Rotate an NV21 image clockwise by `rotation` degrees (0, 90, 180 or 270).
///
/// Returns `None` for any other angle, for odd dimensions, or when `data` is too
/// short for `size`.
pub fn rotate_nv21(data: &[u8], size: Size, rotation: u32) -> Option<Vec<u8>> {
    if rotation % 90 != 0 || rotation > 270 {
        return None;
    }
    let width = size.width as usize;
    let height = size.height as usize;
    let frame_size = width * height;
    if width % 2 != 0 || height % 2 != 0 || data.len() < frame_size * 3 / 2 {
        return None;
    }
    if rotation == 0 {
        return Some(data.to_vec());
    }

    let swap = rotation % 180 != 0;
    let x_flip = rotation % 270 != 0;
    let y_flip = rotation >= 180;
    let (out_width, out_height) = if swap { (height, width) } else { (width, height) };

    let mut output = vec![0u8; data.len()];
    for j in 0..height {
        for i in 0..width {
            let y_in = j * width + i;
            let u_in = frame_size + (j >> 1) * width + (i & !1);
            let v_in = u_in + 1;

            let (i_swapped, j_swapped) = if swap { (j, i) } else { (i, j) };
            let i_out = if x_flip { out_width - i_swapped - 1 } else { i_swapped };
            let j_out = if y_flip { out_height - j_swapped - 1 } else { j_swapped };

            let y_out = j_out * out_width + i_out;
            let u_out = frame_size + (j_out >> 1) * out_width + (i_out & !1);
            let v_out = u_out + 1;

            output[y_out] = data[y_in];
            output[u_out] = data[u_in];
            output[v_out] = data[v_in];
        }
    }
    Some(output)
}
