//! Top-level bitstream walk: the header, the generic
//! ENTER_SUBBLOCK/END_BLOCK/DEFINE_ABBREV/record loop, and dispatch by block
//! id into [`crate::blocks`].

use pexe_types::{BasicBlockId, TypeId};

use crate::abbrev::{
    Abbreviation, BlockInfoAbbrevs, ENTRY_DEFINE_ABBREV, ENTRY_END_BLOCK, ENTRY_ENTER_SUBBLOCK,
    ENTRY_UNABBREV_RECORD, FIRST_APPLICATION_ABBREV,
};
use crate::bitstream::BitReader;
use crate::blocks::{self, BLOCKID_BLOCKINFO, BLOCKID_CONSTANTS, BLOCKID_FUNCTION, BLOCKID_GLOBALVAR,
    BLOCKID_MODULE, BLOCKID_TYPE, BLOCKID_VALUE_SYMTAB};
use crate::error::BitstreamError;
use crate::ir::{BasicBlock, Function, GlobalVar, Module, Type};
use crate::record::{read_abbreviated_record, read_unabbrev_record, Record};

const TOP_LEVEL_ABBREV_WIDTH: u32 = 2;

/// Parse a full PEXE file into a raw, pre-analysis [`Module`].
#[tracing::instrument(skip(data), fields(len = data.len()))]
pub fn parse_module(data: &[u8]) -> Result<Module, BitstreamError> {
    let mut br = BitReader::new(data);
    read_header(&mut br)?;

    let entry = br.read(TOP_LEVEL_ABBREV_WIDTH)?;
    if entry != ENTRY_ENTER_SUBBLOCK {
        return Err(BitstreamError::UnbalancedBlockEnd);
    }
    let block_id = br.read_vbr32(8)?;
    if block_id != BLOCKID_MODULE {
        return Err(BitstreamError::UnknownRecordCode { block_id, code: 0 });
    }

    let mut module = Module::default();
    let mut blockinfo = BlockInfoAbbrevs::new();
    parse_module_block(&mut br, &mut module, &mut blockinfo)?;
    Ok(module)
}

fn read_header(br: &mut BitReader<'_>) -> Result<(), BitstreamError> {
    let mut magic = 0u32;
    for i in 0..4 {
        magic |= (br.read(8)?) << (8 * i);
    }
    const EXPECTED: u32 = u32::from_le_bytes(*b"PEXE");
    if magic != EXPECTED {
        return Err(BitstreamError::BadMagic(magic));
    }

    let num_fields = br.read(16)?;
    let _num_bytes = br.read(16)?;
    for _ in 0..num_fields {
        let ftype = br.read(4)?;
        let id = br.read(4)?;
        if id != 1 {
            return Err(BitstreamError::UnknownRecordCode { block_id: u32::MAX, code: id });
        }
        let _pad = br.read(8)?;
        let length = br.read(16)?;
        match ftype {
            0 => br.skip_bytes(length)?,
            1 => {
                br.read(32)?;
            }
            other => return Err(BitstreamError::UnknownRecordCode { block_id: u32::MAX, code: other }),
        }
    }
    Ok(())
}

/// Enter a nested block: read its new abbreviation width, align, and skip
/// past the 32-bit word-count field, returning that width.
fn enter_subblock(br: &mut BitReader<'_>) -> Result<u32, BitstreamError> {
    let width = br.read_vbr32(4)?;
    br.align32()?;
    let _num_words = br.read(32)?;
    Ok(width)
}

fn parse_module_block(
    br: &mut BitReader<'_>,
    module: &mut Module,
    blockinfo: &mut BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_MODULE).to_vec();
    let mut next_function_body = 0usize;

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => {
                let id = br.read_vbr32(8)?;
                match id {
                    BLOCKID_BLOCKINFO => parse_blockinfo_block(br, blockinfo)?,
                    BLOCKID_TYPE => parse_type_block(br, &mut module.types, blockinfo)?,
                    BLOCKID_GLOBALVAR => parse_globalvar_block(br, &mut module.global_vars, blockinfo)?,
                    BLOCKID_VALUE_SYMTAB => parse_module_symtab(br, module, blockinfo)?,
                    BLOCKID_FUNCTION => {
                        // Find the next declared function with a body.
                        while module.functions.get(next_function_body).map(|f| f.is_declaration_only) == Some(true) {
                            next_function_body += 1;
                        }
                        let idx = next_function_body;
                        next_function_body += 1;
                        parse_function_block(br, module, idx, blockinfo)?;
                    }
                    other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_MODULE, code: other }),
                }
            }
            ENTRY_DEFINE_ABBREV => {
                local_abbrevs.push(Abbreviation::parse(br)?);
            }
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                blocks::handle_module_record(&mut module.functions, &rec)?;
            }
        }
    }
}

fn parse_blockinfo_block(
    br: &mut BitReader<'_>,
    blockinfo: &mut BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut target_block: Option<u32> = None;

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => {
                let abbrev = Abbreviation::parse(br)?;
                let block_id = target_block.ok_or(BitstreamError::AbbrevWidthUnderflow { block_id: 0 })?;
                blockinfo.register(block_id, abbrev);
            }
            _ => {
                let rec = if entry == ENTRY_UNABBREV_RECORD {
                    read_unabbrev_record(br)?
                } else {
                    return Err(BitstreamError::UndefinedAbbrev(entry));
                };
                target_block = Some(blocks::handle_blockinfo_setbid(&rec)?);
            }
        }
    }
}

fn parse_type_block(
    br: &mut BitReader<'_>,
    types: &mut Vec<Type>,
    blockinfo: &BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_TYPE).to_vec();

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => local_abbrevs.push(Abbreviation::parse(br)?),
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                blocks::handle_type_record(types, &rec)?;
            }
        }
    }
}

fn parse_globalvar_block(
    br: &mut BitReader<'_>,
    global_vars: &mut Vec<GlobalVar>,
    blockinfo: &BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_GLOBALVAR).to_vec();
    let mut current = None;
    let mut remaining_compound = 0u32;

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                if let Some(g) = current.take() {
                    global_vars.push(g);
                }
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => local_abbrevs.push(Abbreviation::parse(br)?),
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                blocks::handle_globalvar_record(global_vars, &mut current, &mut remaining_compound, &rec)?;
            }
        }
    }
}

fn parse_module_symtab(
    br: &mut BitReader<'_>,
    module: &mut Module,
    blockinfo: &BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_VALUE_SYMTAB).to_vec();
    let num_functions = module.functions.len();

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => local_abbrevs.push(Abbreviation::parse(br)?),
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                if blocks::is_symtab_entry(rec.code) {
                    let value_id = rec.get_u32(0).unwrap_or(0);
                    let name = blocks::decode_symtab_name(&rec, 1);
                    match blocks::resolve_symtab_target(num_functions, value_id) {
                        blocks::SymtabTarget::Function(i) => {
                            if let Some(f) = module.functions.get_mut(i) {
                                f.name = name;
                            }
                        }
                        blocks::SymtabTarget::GlobalVar(i) => {
                            if let Some(g) = module.global_vars.get_mut(i) {
                                g.name = name;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn parse_function_block(
    br: &mut BitReader<'_>,
    module: &mut Module,
    function_index: usize,
    blockinfo: &BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_FUNCTION).to_vec();
    let mut bb_ids: Vec<BasicBlockId> = Vec::new();
    let mut current_bb = 0usize;
    let num_args = {
        let type_id = module.functions[function_index].type_id;
        match module.types.get(type_id.index()) {
            Some(Type::Function { params, .. }) => params.len() as u32,
            _ => 0,
        }
    };
    module.functions[function_index].num_args = num_args;

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => {
                let id = br.read_vbr32(8)?;
                match id {
                    BLOCKID_CONSTANTS => {
                        let function = &mut module.functions[function_index];
                        parse_constants_block(br, function, &module.types, blockinfo)?;
                    }
                    BLOCKID_VALUE_SYMTAB => parse_function_symtab(br, blockinfo)?,
                    other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_FUNCTION, code: other }),
                }
            }
            ENTRY_DEFINE_ABBREV => local_abbrevs.push(Abbreviation::parse(br)?),
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                if blocks::is_declareblocks(rec.code) {
                    let num_bbs = rec.get_u32(0).unwrap_or(0) as usize;
                    let function = &mut module.functions[function_index];
                    function.blocks = vec![BasicBlock::default(); num_bbs];
                    bb_ids = (0..num_bbs as u32).map(BasicBlockId::new).collect();
                    continue;
                }

                let function = &mut module.functions[function_index];
                let value_count =
                    num_args + function.constants.len() as u32 + total_instructions(function) as u32;
                let names = module.functions.iter().map(|f| f.name.clone()).collect::<Vec<_>>();
                let num_functions = names.len();
                let callee_names = |id: u32| names.get(id as usize).cloned();

                let function = &mut module.functions[function_index];
                if function.blocks.is_empty() {
                    function.blocks.push(BasicBlock::default());
                }
                let inst = blocks::handle_function_record(
                    &mut function.blocks[current_bb],
                    value_count,
                    num_functions,
                    &bb_ids,
                    callee_names,
                    &rec,
                )?;
                let is_terminator = matches!(
                    inst,
                    crate::ir::Instruction::Ret { .. }
                        | crate::ir::Instruction::Br { .. }
                        | crate::ir::Instruction::BrCond { .. }
                        | crate::ir::Instruction::Switch { .. }
                        | crate::ir::Instruction::Unreachable
                );
                function.blocks[current_bb].instructions.push(inst);
                if is_terminator && current_bb + 1 < function.blocks.len() {
                    current_bb += 1;
                }
            }
        }
    }
}

fn total_instructions(function: &Function) -> usize {
    function.blocks.iter().map(|b| b.instructions.len()).sum()
}

fn parse_function_symtab(br: &mut BitReader<'_>, blockinfo: &BlockInfoAbbrevs) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_VALUE_SYMTAB).to_vec();
    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => {
                Abbreviation::parse(br)?;
            }
            _ => {
                // Function-local names (value entries, bb entries) don't
                // affect analysis or execution; read and discard.
                read_record(br, entry, &local_abbrevs)?;
            }
        }
    }
}

fn parse_constants_block(
    br: &mut BitReader<'_>,
    function: &mut Function,
    types: &[Type],
    blockinfo: &BlockInfoAbbrevs,
) -> Result<(), BitstreamError> {
    let width = enter_subblock(br)?;
    let mut local_abbrevs: Vec<Abbreviation> = blockinfo.for_block(BLOCKID_CONSTANTS).to_vec();
    let mut current_type = TypeId::INVALID;

    loop {
        let entry = br.read(width)?;
        match entry {
            ENTRY_END_BLOCK => {
                br.align32()?;
                return Ok(());
            }
            ENTRY_ENTER_SUBBLOCK => return Err(BitstreamError::UnbalancedBlockEnd),
            ENTRY_DEFINE_ABBREV => local_abbrevs.push(Abbreviation::parse(br)?),
            _ => {
                let rec = read_record(br, entry, &local_abbrevs)?;
                blocks::handle_constants_record(function, types, &mut current_type, &rec)?;
            }
        }
    }
}

fn read_record(br: &mut BitReader<'_>, entry: u32, abbrevs: &[Abbreviation]) -> Result<Record, BitstreamError> {
    if entry == ENTRY_UNABBREV_RECORD {
        read_unabbrev_record(br)
    } else if entry >= FIRST_APPLICATION_ABBREV {
        read_abbreviated_record(br, entry, abbrevs)
    } else {
        Err(BitstreamError::UndefinedAbbrev(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_magic_is_rejected() {
        let data = [0u8; 16];
        let err = parse_module(&data).unwrap_err();
        assert!(matches!(err, BitstreamError::BadMagic(_)));
    }
}
