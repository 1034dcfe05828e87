use crate::error::{GranaryError, GranaryResult};
use crate::storage::page::{
    HeapPage, PageId, SlotInfo, PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_ENTRY_SIZE,
};

// data + consumed offset
pub type DecodedData<T> = (T, usize);

pub struct CommonCodec;

impl CommonCodec {
    pub fn encode_u16(data: u16) -> [u8; 2] {
        data.to_be_bytes()
    }

    pub fn decode_u16(bytes: &[u8]) -> GranaryResult<DecodedData<u16>> {
        if bytes.len() < 2 {
            return Err(GranaryError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                2
            )));
        }
        Ok((u16::from_be_bytes([bytes[0], bytes[1]]), 2))
    }

    pub fn encode_i32(data: i32) -> [u8; 4] {
        data.to_be_bytes()
    }

    pub fn decode_i32(bytes: &[u8]) -> GranaryResult<DecodedData<i32>> {
        if bytes.len() < 4 {
            return Err(GranaryError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                4
            )));
        }
        Ok((
            i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            4,
        ))
    }
}

pub struct HeapPageCodec;

impl HeapPageCodec {
    /// Serializes the slot directory over the record image held in
    /// `page.data`. Record bytes already sit at their final offsets.
    pub fn encode_into(page: &HeapPage, out: &mut [u8; PAGE_SIZE]) {
        out.copy_from_slice(&page.data);
        out[0..2].copy_from_slice(&CommonCodec::encode_u16(page.num_slots() as u16));
        let mut cursor = PAGE_HEADER_SIZE;
        for slot in &page.slots {
            out[cursor..cursor + 2].copy_from_slice(&CommonCodec::encode_u16(slot.offset));
            out[cursor + 2..cursor + 4].copy_from_slice(&CommonCodec::encode_u16(slot.len));
            cursor += SLOT_ENTRY_SIZE;
        }
    }

    pub fn encode(page: &HeapPage) -> [u8; PAGE_SIZE] {
        let mut out = [0u8; PAGE_SIZE];
        Self::encode_into(page, &mut out);
        out
    }

    pub fn decode(bytes: &[u8], page_id: PageId) -> GranaryResult<HeapPage> {
        if bytes.len() != PAGE_SIZE {
            return Err(GranaryError::Internal(format!(
                "page image is {} bytes, expected {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let (num_slots, _) = CommonCodec::decode_u16(bytes)?;
        if PAGE_HEADER_SIZE + num_slots as usize * SLOT_ENTRY_SIZE > PAGE_SIZE {
            return Err(GranaryError::Internal(format!(
                "corrupt slot directory on page {}: {} slots",
                page_id, num_slots
            )));
        }
        let mut slots = Vec::with_capacity(num_slots as usize);
        let mut cursor = PAGE_HEADER_SIZE;
        for _ in 0..num_slots {
            let (offset, _) = CommonCodec::decode_u16(&bytes[cursor..])?;
            let (len, _) = CommonCodec::decode_u16(&bytes[cursor + 2..])?;
            if offset as usize + len as usize > PAGE_SIZE {
                return Err(GranaryError::Internal(format!(
                    "corrupt slot on page {}: offset {} len {}",
                    page_id, offset, len
                )));
            }
            slots.push(SlotInfo { offset, len });
            cursor += SLOT_ENTRY_SIZE;
        }
        let mut data = [0u8; PAGE_SIZE];
        data.copy_from_slice(bytes);
        Ok(HeapPage {
            page_id,
            slots,
            data,
        })
    }
}
