mod atomic_io;
mod defs;
mod discovery;
mod loader;
mod records;
mod zone_file;

pub use defs::{
    compile_defs, render_prototype_defs, ContentCompileError, ContentErrorCode, DefSet, ExitDef,
    PrototypeDef, RoomDef, ShopDef, SourceLocation,
};
pub use discovery::{discover_world_sources, DiscoveryError, WorldSources, DEF_DIRS, ZONE_DIR};
pub use loader::{
    load_world, prototype_file_path, save_zone, zone_file_path, LoadedWorld, SaveReport,
    WorldLoadError, WorldSaveError,
};
pub use records::{command_from_record, record_from_command, RecordError};
pub use zone_file::{
    decode_record, decode_zone_file, encode_record, encode_zone_file, ZoneFile, ZoneFileError,
    ZoneFileErrorCode, ZoneFileHeader, ZoneRecord,
};
