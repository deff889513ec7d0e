//! End-to-end tests over whole control files: parsing, scope annotation,
//! edits and write/reparse fidelity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tmf_core::{
    Context, ControlFile, EditError, InMemoryProvider, InputKind, ParseErrorKind, Scope, ScopeKind, ScopeList,
};

fn in_memory(path: &str, text: &str) -> ControlFile {
    let provider = InMemoryProvider::from_pairs([(path, text)]);
    ControlFile::load_with_provider(path, Arc::new(provider)).unwrap()
}

const ZPTS: &str = "Set Zpts == 100\n\
                    If Scenario == DEV\n\
                    \x20   Read Grid Zpts == DEV.tif\n\
                    Else\n\
                    \x20   Read Grid Zpts == EXG.tif\n\
                    End If\n";

#[test]
fn if_else_scopes() {
    let cf = in_memory("/model/m.tgc", ZPTS);
    let inputs = cf.inputs();
    assert_eq!(inputs.len(), 3);

    assert_eq!(inputs[0].scope_detailed(), vec![Scope::global()]);
    assert_eq!(inputs[1].scope_detailed(), vec![Scope::scenario("DEV")]);
    assert_eq!(inputs[2].scope_detailed(), vec![Scope::scenario("DEV").negate()]);
    assert_eq!(inputs[2].scope_simplified(), vec![Scope::else_marker()]);

    assert_eq!(inputs[1].kind(), InputKind::Grid);
    assert!(inputs[1].in_scope(&Scope::scenario("DEV")));
    assert!(!inputs[2].in_scope(&Scope::scenario("DEV")));
    assert!(inputs[2].in_scope(&Scope::scenario("EXG")));
}

#[test]
fn else_if_chain_negates_every_predecessor() {
    let text = "If Scenario == Y\nA == 1\nElse If Scenario == X\nB == 2\nElse If Scenario == Z\nC == 3\nElse\nD == 4\nEnd If\n";
    let cf = in_memory("/m/m.tcf", text);
    let scopes: Vec<Vec<Scope>> = cf.inputs().iter().map(|i| i.scope_detailed()).collect();
    let y = Scope::scenario("Y");
    let x = Scope::scenario("X");
    let z = Scope::scenario("Z");
    assert_eq!(scopes[0], vec![y.clone()]);
    assert_eq!(scopes[1], vec![y.negate(), x.clone()]);
    assert_eq!(scopes[2], vec![y.negate(), x.negate(), z.clone()]);
    assert_eq!(scopes[3], vec![y.negate(), x.negate(), z.negate()]);
    assert_eq!(cf.inputs()[1].scope_simplified(), vec![Scope::else_marker(), x]);
}

#[test]
fn nested_ifs_are_anded() {
    let text = "If Scenario == D01 | D02\n  If Scenario == D03\n    Timestep == 2\n  End If\nEnd If\n";
    let cf = in_memory("/m/m.tcf", text);
    let input = &cf.inputs()[0];
    assert_eq!(
        input.scope_detailed(),
        vec![Scope::scenario("D01 | D02"), Scope::scenario("D03")]
    );
    let none = |_: &str| None;
    assert!(input.scope().evaluate(&Context::parse("-s1 D02 -s2 D03"), &none));
    assert!(!input.scope().evaluate(&Context::parse("-s1 D01 -s2 D02"), &none));
}

#[test]
fn unbalanced_blocks_are_structural_errors() {
    let provider = InMemoryProvider::from_pairs([
        ("/m/open.tcf", "If Scenario == A\nX == 1\n"),
        ("/m/close.tcf", "X == 1\nEnd If\n"),
    ]);
    let provider = Arc::new(provider);
    let open = ControlFile::load_with_provider("/m/open.tcf", provider.clone()).unwrap_err();
    assert_eq!(open.kind, ParseErrorKind::Structure);
    assert_eq!(open.line, 1);
    let close = ControlFile::load_with_provider("/m/close.tcf", provider).unwrap_err();
    assert_eq!(close.kind, ParseErrorKind::Structure);
    assert_eq!(close.line, 2);
    assert!(close.to_string().contains("/m/close.tcf:2"));
}

#[test]
fn broken_child_does_not_poison_parent() {
    let provider = InMemoryProvider::from_pairs([
        ("/m/m.tcf", "Geometry Control File == m.tgc\nBC Control File == m.tbc\n"),
        ("/m/m.tgc", "If Scenario == A\n"),
        ("/m/m.tbc", "BC Database == bc.csv\n"),
    ]);
    let cf = ControlFile::load_with_provider("/m/m.tcf", Arc::new(provider)).unwrap();
    assert!(cf.tgc().is_err());
    assert_eq!(cf.tbc().unwrap().unwrap().inputs().len(), 1);
    assert!(cf.get_inputs(true).is_err());
    assert_eq!(cf.get_inputs(false).unwrap().len(), 2);
}

#[test]
fn comments_are_kept_as_inputs() {
    let cf = in_memory("/m/m.tcf", "! header\n\nTimestep == 1 ! seconds\n# old == 2\n");
    let comments: Vec<_> = cf.inputs().iter().filter(|i| i.is_comment()).collect();
    assert_eq!(comments.len(), 3);
    let ts = cf.find_input(|i| i.lhs() == "Timestep").unwrap();
    assert_eq!(ts.rhs(), Some("1"));
    assert_eq!(ts.comment(), Some("! seconds"));
}

#[test]
fn uncomment_brings_back_a_command() {
    let mut cf = in_memory("/m/m.tcf", "! Read GIS Code == gis\\2d_code_R.shp\n");
    let id = cf.inputs()[0].id();
    cf.uncomment(id).unwrap();
    let input = cf.input(id).unwrap();
    assert_eq!(input.kind(), InputKind::Gis);
    assert_eq!(input.lhs(), "Read GIS Code");
    assert!(input.has_missing_files());
}

#[test]
fn edits_preserve_identity_and_undo() {
    let mut cf = in_memory("/m/m.tcf", ZPTS);
    let ids: Vec<_> = cf.inputs().iter().map(|i| i.id()).collect();

    cf.set_rhs(ids[0], "120").unwrap();
    cf.set_scope(ids[0], ScopeList::from_scopes(vec![Scope::scenario("OPT")]))
        .unwrap();
    let appended = cf.append_input("gis\\2d_zsh_001_R.shp").unwrap();
    assert_eq!(cf.edit_count(), 3);

    let now: Vec<_> = cf.inputs().iter().map(|i| i.id()).collect();
    assert_eq!(&now[..3], &ids[..]);
    assert_eq!(now[3], appended);
    assert_eq!(cf.input(appended).unwrap().lhs(), "Read GIS Z Shape");

    cf.undo().unwrap();
    assert!(cf.input(appended).is_none());
    cf.reset();
    assert_eq!(cf.inputs()[0].rhs(), Some("100"));
    assert!(cf.inputs()[0].scope().is_global());
    assert_eq!(cf.undo(), Err(EditError::NothingToUndo));
}

#[test]
fn write_reparse_keeps_new_scope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.tgc");
    std::fs::write(&path, ZPTS).unwrap();

    let mut cf = ControlFile::load(&path).unwrap();
    let first = cf.inputs()[0].id();
    let wanted = ScopeList::from_scopes(vec![Scope::scenario("DEV").negate(), Scope::scenario("OPT")]);
    cf.set_scope(first, wanted.clone()).unwrap();
    let written = cf.write().unwrap();
    assert_eq!(written, vec![PathBuf::from(&path)]);

    let again = ControlFile::load(&path).unwrap();
    let set = again.find_input(|i| i.lhs() == "Set Zpts").unwrap();
    assert_eq!(set.scope_detailed(), wanted.detailed());
    let dev = again.find_input(|i| i.rhs() == Some("DEV.tif")).unwrap();
    assert_eq!(dev.scope_detailed(), vec![Scope::scenario("DEV")]);
}

#[test]
fn unchanged_write_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let src = "Timestep==1\r\n  If Event == Q100   ! storm\r\n\tEnd Time == 3\r\n  End If\r\n";
    let path = dir.path().join("m.tcf");
    std::fs::write(&path, src).unwrap();
    let out = dir.path().join("copy").join("m.tcf");

    ControlFile::load(&path).unwrap().write_to(&out).unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), src);
}

#[test]
fn read_file_edits_are_written_to_the_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let tcf = dir.path().join("m.tcf");
    let trd = dir.path().join("dev.trd");
    std::fs::write(&tcf, "If Scenario == DEV\n    Read File == dev.trd\nEnd If\n").unwrap();
    std::fs::write(&trd, "Hardware == GPU\n").unwrap();

    let mut cf = ControlFile::load(&tcf).unwrap();
    let hw = cf.find_input(|i| i.lhs() == "Hardware").unwrap().id();
    assert_eq!(cf.input(hw).unwrap().scope_detailed(), vec![Scope::scenario("DEV")]);

    // scope given relative to the read file
    cf.set_scope(hw, ScopeList::from_scopes(vec![Scope::event("Q100")]))
        .unwrap();
    assert_eq!(
        cf.input(hw).unwrap().scope_detailed(),
        vec![Scope::scenario("DEV"), Scope::event("Q100")]
    );
    cf.write().unwrap();

    assert_eq!(
        std::fs::read_to_string(&tcf).unwrap(),
        "If Scenario == DEV\n    Read File == dev.trd\nEnd If\n"
    );
    assert_eq!(
        std::fs::read_to_string(&trd).unwrap(),
        "If Event == Q100\n    Hardware == GPU\nEnd If\n"
    );
}

#[test]
fn graph_files_include_database_sources() {
    let provider = InMemoryProvider::from_pairs([
        ("/m/runs/m.tcf", "BC Control File == ..\\model\\m.tbc\n"),
        ("/m/model/m.tbc", "BC Database == ..\\bc_dbase\\bc.csv\n"),
        (
            "/m/bc_dbase/bc.csv",
            "Name,Source,Column 1,Column 2\nFC01,fc01.csv,Time,Q\n",
        ),
        ("/m/bc_dbase/fc01.csv", "Time,Q\n0,0\n"),
    ]);
    let cf = ControlFile::load_with_provider("/m/runs/m.tcf", Arc::new(provider)).unwrap();
    let files = cf.get_files(true).unwrap();
    assert_eq!(
        files,
        vec![
            PathBuf::from("/m/model/m.tbc"),
            PathBuf::from("/m/bc_dbase/bc.csv"),
            PathBuf::from("/m/bc_dbase/fc01.csv"),
        ]
    );
    let tbc = cf.tbc().unwrap().unwrap();
    let db = tbc.bc_dbase().unwrap().unwrap();
    assert_eq!(db.value("fc01", "source"), Some("fc01.csv"));
    assert!(cf.missing_files(true).unwrap().is_empty());
}

#[test]
fn domain_blocks_scope_without_excluding() {
    let text = "Start 1D Domain\n  Timestep == 1\nEnd 1D Domain\n";
    let cf = in_memory("/m/m.tcf", text);
    let input = &cf.inputs()[0];
    assert_eq!(input.scope().as_slice()[0].kind, ScopeKind::OneDimensionalDomain);
    assert!(input.scope().evaluate(&Context::default(), &|_: &str| None));
    assert!(input.in_scope(&Scope::global()));
}

#[test]
fn control_file_kind_follows_extension() {
    let cf = in_memory("/m/m.ecf", "Timestep == 1\n");
    assert_eq!(cf.kind(), tmf_core::ControlFileKind::Ecf);
    assert_eq!(cf.path(), Path::new("/m/m.ecf"));
}

#[test]
fn inserted_path_gets_keyword_of_its_own_sub_kind() {
    let provider = InMemoryProvider::from_pairs([
        ("/m/m.tcf", "Geometry Control File == m.tgc\n"),
        ("/m/m.tgc", ""),
        ("/m/m.tbc", "BC Database == bc.csv\n"),
    ]);
    let provider = Arc::new(provider);

    let mut tcf = ControlFile::load_with_provider("/m/m.tcf", provider.clone()).unwrap();
    let tgc = tcf.inputs()[0].id();
    let id = tcf.insert_input(tgc, "m.tbc", true).unwrap();
    let inserted = tcf.input(id).unwrap();
    assert_eq!(inserted.lhs(), "BC Control File");
    assert_eq!(inserted.kind(), InputKind::ControlFile(tmf_core::ControlFileKind::Tbc));

    let mut tbc = ControlFile::load_with_provider("/m/m.tbc", provider).unwrap();
    let bc = tbc.inputs()[0].id();
    let id = tbc.insert_input(bc, "mat.tmf", true).unwrap();
    assert_eq!(tbc.input(id).unwrap().lhs(), "Read Materials File");
    let id = tbc.insert_input(bc, "bc_2.csv", false).unwrap();
    assert_eq!(tbc.input(id).unwrap().lhs(), "BC Database");
}

#[test]
fn edited_layer_stays_in_its_spatial_database() {
    let provider = InMemoryProvider::from_pairs([
        (
            "/m/m.tgc",
            "Spatial Database == db.gpkg\nRead GIS Code == 2d_code_R\nSpatial Database == OFF\n",
        ),
        ("/m/db.gpkg", ""),
    ]);
    let mut cf = ControlFile::load_with_provider("/m/m.tgc", Arc::new(provider)).unwrap();
    let code = cf.find_input(|i| i.lhs() == "Read GIS Code").unwrap().id();
    cf.set_rhs(code, "2d_code_v2_R").unwrap();

    let files = cf.input(code).unwrap().files().to_vec();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, PathBuf::from("/m/db.gpkg"));
    assert_eq!(files[0].layer.as_deref(), Some("2d_code_v2_R"));
    assert!(!files[0].missing);

    // the layer is rederived the same way when the edit log is replayed
    cf.set_scope(code, ScopeList::from_scopes(vec![Scope::scenario("DEV")]))
        .unwrap();
    cf.undo().unwrap();
    assert_eq!(cf.input(code).unwrap().files()[0].layer.as_deref(), Some("2d_code_v2_R"));

    let new = cf.insert_input(code, "Read GIS Code == 2d_code_v3_R", true).unwrap();
    let inserted = cf.input(new).unwrap();
    assert_eq!(inserted.files()[0].layer.as_deref(), Some("2d_code_v3_R"));
    assert_eq!(inserted.files()[0].path, PathBuf::from("/m/db.gpkg"));
}

#[test]
fn tokenised_child_control_file_is_followed() {
    let provider = InMemoryProvider::from_pairs([
        (
            "/m/m.tcf",
            "Geometry Control File == m_<<~s1~>>.tgc\nTimestep == 2\n",
        ),
        ("/m/m_DEV.tgc", "Read Grid Zpts == grid\\DEM_<<CELL>>.tif\n"),
        ("/m/grid/DEM_5m.tif", ""),
        ("/m/grid/DEM_10m.tif", ""),
    ]);
    let cf = ControlFile::load_with_provider("/m/m.tcf", Arc::new(provider)).unwrap();

    let tgc = &cf.inputs()[0];
    assert_eq!(tgc.kind(), InputKind::ControlFile(tmf_core::ControlFileKind::Tgc));
    assert_eq!(tgc.files().len(), 1);
    assert_eq!(tgc.files()[0].path, PathBuf::from("/m/m_DEV.tgc"));
    assert_eq!(tgc.files()[0].layer, None);

    let inputs = cf.get_inputs(true).unwrap();
    assert_eq!(inputs.len(), 3);
    let grid = inputs.iter().find(|i| i.lhs() == "Read Grid Zpts").unwrap();
    assert_eq!(grid.files().len(), 2);
    assert!(grid.files().iter().all(|f| f.layer.is_none() && !f.missing));
    assert!(cf.missing_files(true).unwrap().is_empty());
}
