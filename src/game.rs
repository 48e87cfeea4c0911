use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Board dimension
pub const BOARD_SIZE: usize = 8;

/// Content of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Occupant {
    #[default]
    Empty,
    White,
    Black,
}

impl Occupant {
    pub fn is_empty(&self) -> bool {
        *self == Occupant::Empty
    }

    pub fn symbol(&self) -> char {
        match self {
            Occupant::Empty => '.',
            Occupant::White => 'W',
            Occupant::Black => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Player {
    White,
    Black,
}

impl Player {
    pub fn opponent(&self) -> Player {
        match self {
            Player::White => Player::Black,
            Player::Black => Player::White,
        }
    }

    pub fn piece(&self) -> Occupant {
        match self {
            Player::White => Occupant::White,
            Player::Black => Occupant::Black,
        }
    }

    /// Row this player has to reach to win
    pub fn target_row(&self) -> usize {
        match self {
            Player::White => 0,
            Player::Black => BOARD_SIZE - 1,
        }
    }

    /// The two rows filled by this player at the start
    pub fn home_rows(&self) -> [usize; 2] {
        match self {
            Player::White => [BOARD_SIZE - 2, BOARD_SIZE - 1],
            Player::Black => [0, 1],
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Player::White => "White",
            Player::Black => "Black",
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row < BOARD_SIZE && self.col < BOARD_SIZE
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Position,
    pub to: Position,
}

impl Move {
    pub fn new(from: Position, to: Position) -> Self {
        Move { from, to }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// One applied move, kept in the history so it can be taken back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub from: Position,
    pub to: Position,
    pub moving: Occupant,
    pub captured: Occupant,
}

impl MoveRecord {
    pub fn is_capture(&self) -> bool {
        !self.captured.is_empty()
    }
}

/// Why a move was rejected by the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("Move is out of bounds: {0}")]
    OutOfBounds(Position),
    #[error("Move is too far: {from} -> {to}")]
    TooFar { from: Position, to: Position },
    #[error("Cannot capture own piece at {0}")]
    OwnPiece(Position),
    #[error("{player} must move {}: {from} -> {to}", direction_word(.player))]
    WrongDirection {
        player: Player,
        from: Position,
        to: Position,
    },
}

fn direction_word(player: &Player) -> &'static str {
    match player {
        Player::White => "upwards",
        Player::Black => "downwards",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Illegal move: {0}")]
    IllegalMove(#[from] MoveError),
    #[error("No piece of the current player at {0}")]
    NotYourPiece(Position),
    #[error("Nothing to undo")]
    EmptyHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Occupant; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    pub fn empty() -> Self {
        Board {
            cells: [[Occupant::Empty; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Out-of-range cells read as empty.
    pub fn get(&self, pos: Position) -> Occupant {
        if pos.in_bounds() {
            self.cells[pos.row][pos.col]
        } else {
            Occupant::Empty
        }
    }

    /// Panics if `pos` is off the board.
    pub fn set(&mut self, pos: Position, occupant: Occupant) {
        self.cells[pos.row][pos.col] = occupant;
    }

    pub fn rows(&self) -> &[[Occupant; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    pub fn count(&self, occupant: Occupant) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&cell| cell == occupant)
            .count()
    }
}

impl Default for Board {
    fn default() -> Self {
        init_board()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  ")?;
        for col in 0..BOARD_SIZE {
            write!(f, " {}", col)?;
        }
        writeln!(f)?;
        for (row, cells) in self.cells.iter().enumerate() {
            write!(f, "{} ", row)?;
            for cell in cells {
                write!(f, " {}", cell.symbol())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Starting position: Black fills rows 0 and 1, White the last two rows.
pub fn init_board() -> Board {
    let mut board = Board::empty();
    for player in [Player::White, Player::Black] {
        for row in player.home_rows() {
            for col in 0..BOARD_SIZE {
                board.set(Position::new(row, col), player.piece());
            }
        }
    }
    board
}

/// Checks a move against the rules, reporting the first rule it breaks.
///
/// Rules are applied in order: bounds, one-step adjacency, no landing on an
/// own piece, strict forward direction. Captures happen on any forward step,
/// straight ahead included. The occupant of `from` is not examined here.
pub fn check_move(
    board: &Board,
    player: Player,
    from: Position,
    to: Position,
) -> Result<(), MoveError> {
    if !to.in_bounds() {
        return Err(MoveError::OutOfBounds(to));
    }
    if !from.in_bounds() {
        return Err(MoveError::OutOfBounds(from));
    }
    if from.row.abs_diff(to.row) > 1 || from.col.abs_diff(to.col) > 1 {
        return Err(MoveError::TooFar { from, to });
    }
    if board.get(to) == player.piece() {
        return Err(MoveError::OwnPiece(to));
    }
    let forward = match player {
        Player::White => to.row < from.row,
        Player::Black => to.row > from.row,
    };
    if !forward {
        return Err(MoveError::WrongDirection { player, from, to });
    }
    Ok(())
}

pub fn is_legal_move(board: &Board, player: Player, from: Position, to: Position) -> bool {
    check_move(board, player, from, to).is_ok()
}

/// White wins with a piece on row 0, Black with a piece on the last row.
/// Both edges are examined on every call, White's first.
pub fn is_terminal(board: &Board) -> Option<Player> {
    [Player::White, Player::Black].into_iter().find(|player| {
        board.rows()[player.target_row()]
            .iter()
            .any(|&cell| cell == player.piece())
    })
}

/// Result of a successful [`GameState::attempt_move`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was played and the turn passed to `next_player`.
    Moved {
        record: MoveRecord,
        next_player: Player,
    },
    /// The move won the game; the state has already been reset.
    GameOver { winner: Player, record: MoveRecord },
}

/// Result of clicking a cell through [`GameState::select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Selected(Position),
    /// Nothing was selected and the cell does not hold a piece of the mover.
    Ignored,
    Attempted(Result<MoveOutcome, GameError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    current_player: Player,
    history: Vec<MoveRecord>,
    selected: Option<Position>,
}

impl GameState {
    /// Create a new game with White to move
    pub fn new() -> Self {
        GameState {
            board: init_board(),
            current_player: Player::White,
            history: Vec::new(),
            selected: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn occupant(&self, pos: Position) -> Occupant {
        self.board.get(pos)
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn selected(&self) -> Option<Position> {
        self.selected
    }

    pub fn piece_count(&self, player: Player) -> usize {
        self.board.count(player.piece())
    }

    pub fn winner(&self) -> Option<Player> {
        is_terminal(&self.board)
    }

    pub fn is_legal_move(&self, from: Position, to: Position) -> bool {
        is_legal_move(&self.board, self.current_player, from, to)
    }

    /// Plays a move without switching turns or checking for a win.
    ///
    /// Illegal moves are rejected without touching the state.
    pub fn apply_move(&mut self, from: Position, to: Position) -> Result<MoveRecord, MoveError> {
        check_move(&self.board, self.current_player, from, to)?;

        let record = MoveRecord {
            from,
            to,
            moving: self.board.get(from),
            captured: self.board.get(to),
        };
        self.board.set(to, record.moving);
        self.board.set(from, Occupant::Empty);
        self.history.push(record);

        Ok(record)
    }

    /// Takes back the last move and hands the turn back once.
    pub fn undo_last(&mut self) -> bool {
        self.try_undo_last().is_ok()
    }

    pub fn try_undo_last(&mut self) -> Result<MoveRecord, GameError> {
        let record = self.history.pop().ok_or(GameError::EmptyHistory)?;
        self.board.set(record.from, record.moving);
        self.board.set(record.to, record.captured);
        self.switch_player();
        self.selected = None;
        debug!(from = %record.from, to = %record.to, "undid move");
        Ok(record)
    }

    pub fn switch_player(&mut self) {
        self.current_player = self.current_player.opponent();
    }

    pub fn reset_game(&mut self) {
        *self = GameState::new();
        info!("game reset");
    }

    /// Validate, apply, look for a winner, then either reset or pass the turn.
    pub fn attempt_move(
        &mut self,
        from: Position,
        to: Position,
    ) -> Result<MoveOutcome, GameError> {
        self.selected = None;

        if self.board.get(from) != self.current_player.piece() {
            debug!(%from, player = %self.current_player, "no own piece to move");
            return Err(GameError::NotYourPiece(from));
        }

        let record = self.apply_move(from, to).inspect_err(|e| {
            debug!(%from, %to, reason = %e, "move rejected");
        })?;
        debug!(%from, %to, capture = record.is_capture(), "move applied");

        if let Some(winner) = is_terminal(&self.board) {
            info!(%winner, "game over");
            self.reset_game();
            return Ok(MoveOutcome::GameOver { winner, record });
        }

        self.switch_player();
        Ok(MoveOutcome::Moved {
            record,
            next_player: self.current_player,
        })
    }

    /// Two-click move entry: the first click picks a piece, the second tries
    /// to move it there.
    pub fn select(&mut self, pos: Position) -> Selection {
        match self.selected {
            Some(from) => Selection::Attempted(self.attempt_move(from, pos)),
            None if self.board.get(pos) == self.current_player.piece() => {
                debug!(%pos, "selected");
                self.selected = Some(pos);
                Selection::Selected(pos)
            }
            None => Selection::Ignored,
        }
    }

    /// Legal destinations for the piece on `from`, if it belongs to the mover
    pub fn legal_moves_from(&self, from: Position) -> Vec<Move> {
        if self.board.get(from) != self.current_player.piece() {
            return Vec::new();
        }

        let mut moves = Vec::new();
        let rows = from.row.saturating_sub(1)..=(from.row + 1).min(BOARD_SIZE - 1);
        for row in rows {
            for col in from.col.saturating_sub(1)..=(from.col + 1).min(BOARD_SIZE - 1) {
                let to = Position::new(row, col);
                if self.is_legal_move(from, to) {
                    moves.push(Move::new(from, to));
                }
            }
        }
        moves
    }

    /// Get all legal moves for the current player
    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                moves.extend(self.legal_moves_from(Position::new(row, col)));
            }
        }
        moves
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
