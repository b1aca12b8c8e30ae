//! Line tokenizer, hex codec, and `R`/`W`/`V`/`F` verb dispatch (C5).
//!
//! Everything here is synchronous: a line only ever reaches [`execute_line`]
//! once the command loop has already assembled it from
//! [`crate::hardware::serial::Serial`], and `execute_line` itself only ever
//! blocks on `serial` for the `F` verb's payload bytes.

use crate::boards::{BoardConfig, BoardConfiguration};
use crate::hardware::flash::FlashDeviceSource;
use crate::hardware::register::{reg_read, reg_write};
use crate::hardware::serial::Serial;
use defmt::{debug, error, info};
use flash_engine::{FlashEngine, Request};
use heapless::Vec;

/// Sector size of the attached flash chip (spec.md §6): one 32 Mbit part,
/// 64 sectors of 64 KiB each. A fresh [`FlashEngine`] of this size is built
/// around every `F` command's device handle.
const SECTOR_BYTES: usize = 65536;

/// Longest command line this firmware accepts, including the verb. `F
/// <hexaddr> <hexlen> <hexsum>` is the longest command: `1 + 1 + 8 + 1 + 8 +
/// 1 + 8 = 28` characters; 64 leaves comfortable headroom.
pub const LINE_CAP: usize = 64;

/// Largest payload an `F` command will stage in RAM before handing it to
/// `engine_write`. Not specified by the protocol itself, but some bound is
/// unavoidable for a fixed, no-alloc buffer; two sectors covers every
/// scenario in the protocol's own examples with margin for a straddling
/// write.
pub const MAX_PAYLOAD: usize = 2 * 65536;

/// Firmware build identifier reported by the `V` command's `NIOS=` field —
/// the name is the wire protocol's, kept verbatim; this firmware has no Nios
/// II core, it only speaks the field that one used to report.
const FIRMWARE_VERSION: u32 = 0x0001_0000;

/// Byte offset of the FPGA version register within the register window,
/// reported by the `V` command's `FPGA=` field.
const FPGA_VERSION_REGISTER: u32 = 0x000;

const NEGATIVE_REPLY: &[u8] = b"N\r\n";

/// A line ends at `\r` or `\n` (spec.md §4.5); shared with the console's own
/// byte-assembly loop so the boundary is defined in exactly one place.
pub fn is_line_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Upper-cases alphabetic bytes of `line` in place, then splits on
/// whitespace into at most 4 tokens. Returns `None` if there are more than 4
/// tokens; zero tokens yields `Some(empty vec)`, which callers treat as a
/// parse failure the same as an unrecognised verb.
///
/// Two passes over `line` rather than one: upper-casing needs a mutable
/// borrow, tokenizing only needs to read and slice, and doing both at once
/// would hold a mutable and immutable borrow of `line` simultaneously.
fn tokenize(line: &mut [u8]) -> Option<Vec<&[u8], 4>> {
    for b in line.iter_mut() {
        if b.is_ascii_lowercase() {
            *b = b.to_ascii_uppercase();
        }
    }

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < line.len() {
        while i < line.len() && is_space(line[i]) {
            i += 1;
        }
        if i >= line.len() {
            break;
        }
        let start = i;
        while i < line.len() && !is_space(line[i]) {
            i += 1;
        }
        if tokens.push(&line[start..i]).is_err() {
            return None;
        }
    }
    Some(tokens)
}

fn hex_nibble(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u32),
        b'A'..=b'F' => Some((b - b'A' + 10) as u32),
        _ => None,
    }
}

/// Parses a hex token: optional `0X` prefix, 1-8 hex digits. Fails on empty
/// input, more than 8 digits, or a non-hex character. Tokens are assumed
/// already upper-cased by [`tokenize`].
fn parse_hex_u32(token: &[u8]) -> Option<u32> {
    let digits = if token.len() >= 2 && token[0] == b'0' && token[1] == b'X' {
        &token[2..]
    } else {
        token
    };
    if digits.is_empty() || digits.len() > 8 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in digits {
        value = (value << 4) | hex_nibble(b)?;
    }
    Some(value)
}

/// Formats `value` as 8 upper-case hex digits, zero-padded.
fn format_hex_u32(value: u32, out: &mut [u8; 8]) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for i in 0..8 {
        let shift = 4 * (7 - i);
        out[i] = DIGITS[((value >> shift) & 0xF) as usize];
    }
}

fn reply_ok(serial: &mut impl Serial) {
    serial.send_str(b"Y\r\n");
}

fn reply_err(serial: &mut impl Serial) {
    serial.send_str(NEGATIVE_REPLY);
}

fn do_read_register(serial: &mut impl Serial, tokens: &Vec<&[u8], 4>) {
    if tokens.len() != 2 {
        return reply_err(serial);
    }
    let Some(addr) = parse_hex_u32(tokens[1]) else {
        return reply_err(serial);
    };
    let mut value = 0u32;
    if !reg_read(addr, &mut value) {
        error!("R: register 0x{:08X} out of bounds or unaligned", addr);
        return reply_err(serial);
    }
    debug!("R 0x{:08X} -> 0x{:08X}", addr, value);
    let mut hex = [0u8; 8];
    format_hex_u32(value, &mut hex);
    serial.send_str(b"Y ");
    serial.send_str(&hex);
    serial.send_str(b"\r\n");
}

fn do_write_register(serial: &mut impl Serial, tokens: &Vec<&[u8], 4>) {
    if tokens.len() != 3 {
        return reply_err(serial);
    }
    let (Some(addr), Some(value)) = (parse_hex_u32(tokens[1]), parse_hex_u32(tokens[2])) else {
        return reply_err(serial);
    };
    if reg_write(addr, value) {
        debug!("W 0x{:08X} <- 0x{:08X}", addr, value);
        reply_ok(serial);
    } else {
        error!("W: register 0x{:08X} out of bounds or unaligned", addr);
        reply_err(serial);
    }
}

fn do_report_versions(serial: &mut impl Serial, tokens: &Vec<&[u8], 4>) {
    if tokens.len() != 1 {
        return reply_err(serial);
    }
    let mut fpga_version = 0u32;
    if !reg_read(FPGA_VERSION_REGISTER, &mut fpga_version) {
        return reply_err(serial);
    }
    let mut fpga_hex = [0u8; 8];
    let mut nios_hex = [0u8; 8];
    format_hex_u32(fpga_version, &mut fpga_hex);
    format_hex_u32(FIRMWARE_VERSION, &mut nios_hex);
    serial.send_str(b"FPGA=0x");
    serial.send_str(&fpga_hex);
    serial.send_str(b" NIOS=0x");
    serial.send_str(&nios_hex);
    serial.send_str(b"\r\n");
}

/// Runs the `F` verb's payload phase and programs flash with it. `payload`
/// is scratch space owned by the caller (the command loop), sized
/// `MAX_PAYLOAD`. Opens a fresh flash device handle for the duration of the
/// program step and closes it before returning, per spec.md §4.5 step 5 /
/// §5 ("must not be held across commands").
fn do_program_flash<S: FlashDeviceSource>(
    serial: &mut impl Serial,
    tokens: &Vec<&[u8], 4>,
    device_source: &mut S,
    payload: &mut [u8; MAX_PAYLOAD],
) {
    if tokens.len() != 4 {
        return reply_err(serial);
    }
    let (Some(addr), Some(length), Some(checksum)) = (
        parse_hex_u32(tokens[1]),
        parse_hex_u32(tokens[2]),
        parse_hex_u32(tokens[3]),
    ) else {
        return reply_err(serial);
    };
    let length = length as usize;
    if length > MAX_PAYLOAD {
        error!("F: length 0x{:X} exceeds staging buffer", length);
        return reply_err(serial);
    }

    info!("F: receiving 0x{:X} bytes for 0x{:08X}", length, addr);
    serial.drain_rx();
    reply_ok(serial);

    let mut accumulator: u32 = 0;
    for slot in payload[..length].iter_mut() {
        let byte = serial.read_char_blocking();
        *slot = byte;
        accumulator = accumulator.wrapping_add(byte as u32);
    }

    if accumulator != checksum {
        error!("F: checksum mismatch, got 0x{:08X} want 0x{:08X}", accumulator, checksum);
        return reply_err(serial);
    }

    let mut device = match device_source.open() {
        Ok(device) => device,
        Err(_) => {
            error!("F: could not open flash device");
            return reply_err(serial);
        }
    };

    let mut engine: FlashEngine<S::Device, SECTOR_BYTES> = FlashEngine::new(device);
    let result = engine.engine_write(addr, Request::Program(&payload[..length]));
    device = engine.into_device();
    device_source.close(device);

    match result {
        Ok(()) => {
            info!("F: programmed 0x{:X} bytes at 0x{:08X}", length, addr);
            reply_ok(serial);
        }
        Err(_) => {
            error!("F: flash engine failed programming 0x{:08X}", addr);
            reply_err(serial);
        }
    }
}

/// Parses and executes one already-assembled command line (no terminator
/// bytes). `line` is mutated in place by the tokenizer's upper-casing pass.
pub fn execute_line<S: FlashDeviceSource>(
    line: &mut [u8],
    serial: &mut impl Serial,
    device_source: &mut S,
    payload: &mut [u8; MAX_PAYLOAD],
) {
    let Some(tokens) = tokenize(line) else {
        error!("line has more than 4 tokens");
        return reply_err(serial);
    };
    if tokens.is_empty() {
        return reply_err(serial);
    }

    match tokens[0].first() {
        Some(b'R') => do_read_register(serial, &tokens),
        Some(b'W') => do_write_register(serial, &tokens),
        Some(b'V') => do_report_versions(serial, &tokens),
        Some(b'F') => do_program_flash(serial, &tokens, device_source, payload),
        Some(verb) => {
            error!("unrecognised verb 0x{:02X}", verb);
            reply_err(serial);
        }
        None => reply_err(serial),
    }
}

/// Validates `BoardConfig::REGISTER_SPAN` covers the version register and
/// that the board's flash size matches what this firmware's `SECTOR_BYTES`
/// assumption expects, so a misconfigured board fails fast at boot rather
/// than silently misreporting.
pub fn sanity_check_board() -> bool {
    BoardConfig::REGISTER_SPAN > FPGA_VERSION_REGISTER && BoardConfig::FLASH_SIZE_BYTES % 65536 == 0
}
